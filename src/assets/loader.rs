//! Progressive Asset Loader
//!
//! Resolves a logical asset name to a bitmap, checking the render cache,
//! then the persistent store, then raw asset storage. Concurrent requests for
//! the same physical file share one in-flight load.
//!
//! ```text
//! get_image(name)
//!   ├─ RenderCache::get_bitmap(name) ─────────────── hit → return
//!   ├─ ContentStore::get::<AssetBytes>("asset:name") ─ hit → decode → cache
//!   └─ path = <base>/<name><suffix>.<ext>
//!        ├─ in flight? → await shared load
//!        └─ read → decode → RenderCache (+ ContentStore) → AssetRecord
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::decode::decode_bitmap;
use super::quality::{optimal_quality, QualityTier};
use super::source::AssetSource;
use crate::clock::SharedClock;
use crate::config::serde_duration_ms;
use crate::error::Result;
use crate::render::{Bitmap, BitmapHandle, RenderCache};
use crate::store::{asset_key, AssetBytes, ContentStore, TtlPolicy};
use crate::telemetry::{Metadata, PerformanceMonitor, ASSET_LOAD_PREFIX};

/// Encoded assets at or below this size are not persisted
pub const DEFAULT_MIN_PERSIST_BYTES: usize = 4 * 1024;

/// Default per-item preload timeout
pub const DEFAULT_PRELOAD_TIMEOUT: Duration = Duration::from_secs(2);

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Encoded size an asset must exceed to be written to the store
    pub min_persist_bytes: usize,
    /// Timeout applied to each item of a preload batch
    #[serde(with = "serde_duration_ms")]
    pub preload_timeout: Duration,
    /// TTL of persisted asset bytes; taken from the engine's TTL policy
    #[serde(skip)]
    pub asset_ttl: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            min_persist_bytes: DEFAULT_MIN_PERSIST_BYTES,
            preload_timeout: DEFAULT_PRELOAD_TIMEOUT,
            asset_ttl: TtlPolicy::default().asset,
        }
    }
}

/// Metadata about a loaded asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub name: String,
    pub quality_tier: QualityTier,
    /// Decoded bitmap size in bytes
    pub byte_size: u64,
    pub dimensions: (u32, u32),
    pub loaded_at: DateTime<Utc>,
}

/// Loader memory snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Bitmaps resident in the render cache
    pub cached_count: usize,
    /// Bitmap memory still alive, in MiB
    pub total_size_mb: f64,
    /// Loads currently in flight
    pub pending_loads: usize,
}

/// Outcome of a preload batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreloadReport {
    pub requested: usize,
    pub loaded: usize,
    pub failed: Vec<String>,
    pub timed_out: Vec<String>,
}

type LoadFuture = Shared<BoxFuture<'static, Option<BitmapHandle>>>;

struct LoaderInner {
    config: LoaderConfig,
    source: Arc<dyn AssetSource>,
    store: Arc<ContentStore>,
    render: Arc<RenderCache>,
    monitor: Arc<PerformanceMonitor>,
    clock: SharedClock,
    in_flight: Mutex<HashMap<String, LoadFuture>>,
    records: DashMap<String, AssetRecord>,
}

/// Progressive asset loader; cloning shares the same loader
#[derive(Clone)]
pub struct AssetLoader {
    inner: Arc<LoaderInner>,
}

impl AssetLoader {
    /// Create a new loader
    pub fn new(
        config: LoaderConfig,
        source: Arc<dyn AssetSource>,
        store: Arc<ContentStore>,
        render: Arc<RenderCache>,
        monitor: Arc<PerformanceMonitor>,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                config,
                source,
                store,
                render,
                monitor,
                clock,
                in_flight: Mutex::new(HashMap::new()),
                records: DashMap::new(),
            }),
        }
    }

    /// Quality new loads should use given current render-cache pressure
    pub fn current_optimal_quality(&self) -> QualityTier {
        optimal_quality(
            self.inner.monitor.device_tier(),
            self.inner.render.bitmap_count(),
        )
    }

    /// Resolve `name` to a bitmap; `None` on any failure
    #[instrument(skip(self))]
    pub async fn get_image(
        &self,
        name: &str,
        requested: Option<QualityTier>,
    ) -> Option<BitmapHandle> {
        let inner = &self.inner;

        if let Some(handle) = inner.render.get_bitmap(name) {
            debug!(name, "Asset served from render cache");
            return Some(handle);
        }

        if let Some(handle) = self.load_persisted(name).await {
            return Some(handle);
        }

        let quality = requested.unwrap_or_else(|| self.current_optimal_quality());
        let path = inner.source.path_for(name, quality);

        let load = {
            let mut in_flight = inner.in_flight.lock();
            if let Some(existing) = in_flight.get(&path).cloned() {
                debug!(name, path = %path, "Joining in-flight load");
                existing
            } else {
                // Runs as its own task: completes and fills the caches even
                // if every waiter is dropped
                let task = tokio::spawn(Self::load_from_source(
                    inner.clone(),
                    name.to_string(),
                    path.clone(),
                    quality,
                ));
                let owner = inner.clone();
                let task_path = path.clone();
                let load = async move {
                    match task.await {
                        Ok(handle) => handle,
                        Err(e) => {
                            warn!(path = %task_path, error = %e, "Asset load task failed");
                            owner.in_flight.lock().remove(&task_path);
                            None
                        }
                    }
                }
                .boxed()
                .shared();
                in_flight.insert(path, load.clone());
                load
            }
        };

        load.await
    }

    async fn load_persisted(&self, name: &str) -> Option<BitmapHandle> {
        let inner = &self.inner;
        let key = asset_key(name);
        let asset: AssetBytes = inner.store.get(&key).await?;

        match decode_bitmap(name, asset.bytes, asset.quality).await {
            Ok(bitmap) => {
                debug!(name, quality = %asset.quality, "Asset served from content store");
                let handle = inner.render.insert_bitmap(name, bitmap);
                inner.record(name, asset.quality, &handle);
                Some(handle)
            }
            Err(e) => {
                warn!(name, error = %e, "Persisted asset undecodable, purging");
                if let Err(e) = inner.store.invalidate(&key).await {
                    warn!(name, error = %e, "Failed to purge persisted asset");
                }
                None
            }
        }
    }

    async fn load_from_source(
        inner: Arc<LoaderInner>,
        name: String,
        path: String,
        quality: QualityTier,
    ) -> Option<BitmapHandle> {
        let operation = format!("{}:{}", ASSET_LOAD_PREFIX, name);
        inner.monitor.start_operation(&operation);

        let result = inner.read_and_decode(&name, &path, quality).await;
        let handle = match result {
            Ok((bytes, bitmap)) => {
                let handle = inner.render.insert_bitmap(&name, bitmap);
                inner.persist(&name, quality, bytes).await;
                inner.record(&name, quality, &handle);
                Some(handle)
            }
            Err(e) => {
                warn!(name = %name, path = %path, error = %e, "Asset load failed");
                None
            }
        };

        let mut metadata = Metadata::new();
        metadata.insert("path".to_string(), path.clone());
        metadata.insert("quality".to_string(), quality.to_string());
        metadata.insert("success".to_string(), handle.is_some().to_string());
        inner.monitor.end_operation(&operation, metadata);

        inner.in_flight.lock().remove(&path);
        handle
    }

    /// Load every name concurrently, each bounded by the preload timeout.
    ///
    /// Failures and timeouts are reported, never raised.
    pub async fn preload_critical<I, S>(&self, names: I, quality: Option<QualityTier>) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        let timeout = self.inner.config.preload_timeout;

        let results = join_all(names.iter().map(|name| async move {
            let outcome = tokio::time::timeout(timeout, self.get_image(name, quality)).await;
            (name.clone(), outcome)
        }))
        .await;

        let mut report = PreloadReport {
            requested: names.len(),
            ..Default::default()
        };
        for (name, outcome) in results {
            match outcome {
                Ok(Some(_)) => report.loaded += 1,
                Ok(None) => report.failed.push(name),
                Err(_) => report.timed_out.push(name),
            }
        }

        info!(
            requested = report.requested,
            loaded = report.loaded,
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            "Preload finished"
        );
        report
    }

    /// Preload assets the monitor flagged as slow
    pub async fn warm_up(&self) -> PreloadReport {
        let candidates = self.inner.monitor.take_warmup_candidates();
        if candidates.is_empty() {
            return PreloadReport::default();
        }
        debug!(count = candidates.len(), "Warming up slow assets");
        self.preload_critical(candidates, None).await
    }

    /// Drop every cached bitmap and the asset records
    pub fn clear_memory_cache(&self) {
        let removed = self.inner.render.remove_bitmaps();
        self.inner.records.clear();
        info!(removed, "Cleared asset memory cache");
    }

    /// Memory snapshot
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            cached_count: self.inner.render.bitmap_count(),
            total_size_mb: self.inner.render.bitmap_ledger().live_bytes() as f64
                / (1024.0 * 1024.0),
            pending_loads: self.inner.in_flight.lock().len(),
        }
    }

    /// Metadata recorded for the last load of `name`
    pub fn asset_record(&self, name: &str) -> Option<AssetRecord> {
        self.inner.records.get(name).map(|r| r.value().clone())
    }
}

impl LoaderInner {
    async fn read_and_decode(
        &self,
        name: &str,
        path: &str,
        quality: QualityTier,
    ) -> Result<(Bytes, Bitmap)> {
        let bytes = self.source.read(path).await?;
        let bitmap = decode_bitmap(name, bytes.clone(), quality).await?;
        Ok((bytes, bitmap))
    }

    async fn persist(&self, name: &str, quality: QualityTier, bytes: Bytes) {
        if bytes.len() <= self.config.min_persist_bytes {
            return;
        }
        if !self.monitor.current_profile().enable_background_caching {
            debug!(name, "Background caching disabled, not persisting asset");
            return;
        }
        let size = bytes.len();
        let asset = AssetBytes { quality, bytes };
        match self
            .store
            .put(&asset_key(name), asset, self.config.asset_ttl)
            .await
        {
            Ok(()) => debug!(name, size, "Persisted asset bytes"),
            Err(e) => warn!(name, error = %e, "Failed to persist asset bytes"),
        }
    }

    fn record(&self, name: &str, quality: QualityTier, handle: &BitmapHandle) {
        self.records.insert(
            name.to_string(),
            AssetRecord {
                name: name.to_string(),
                quality_tier: quality,
                byte_size: handle.byte_size(),
                dimensions: handle.dimensions(),
                loaded_at: self.clock.now(),
            },
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::decode::tests::png;
    use crate::assets::source::InMemoryAssetSource;
    use crate::clock::ManualClock;
    use crate::render::RenderCacheConfig;
    use crate::telemetry::TelemetryConfig;

    struct Fixture {
        loader: AssetLoader,
        source: Arc<InMemoryAssetSource>,
        store: Arc<ContentStore>,
        render: Arc<RenderCache>,
        monitor: Arc<PerformanceMonitor>,
        clock: Arc<ManualClock>,
    }

    async fn fixture(tier: QualityTier, config: LoaderConfig, source: InMemoryAssetSource) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let source = Arc::new(source);
        let store = Arc::new(ContentStore::in_memory().await.unwrap());
        let monitor = Arc::new(PerformanceMonitor::new(
            TelemetryConfig::default(),
            tier,
            clock.clone(),
        ));
        let render = Arc::new(
            RenderCache::new(RenderCacheConfig::default(), clock.clone()).with_monitor(monitor.clone()),
        );
        let loader = AssetLoader::new(
            config,
            source.clone(),
            store.clone(),
            render.clone(),
            monitor.clone(),
            clock.clone(),
        );
        Fixture {
            loader,
            source,
            store,
            render,
            monitor,
            clock,
        }
    }

    #[tokio::test]
    async fn test_load_from_source_then_cache() {
        let source = InMemoryAssetSource::new();
        source.insert("breaker", QualityTier::High, png(4, 4, [1, 2, 3, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        let first = f.loader.get_image("breaker", None).await.unwrap();
        let second = f.loader.get_image("breaker", None).await.unwrap();

        assert!(BitmapHandle::ptr_eq(&first, &second));
        assert_eq!(f.source.reads(), 1);

        let record = f.loader.asset_record("breaker").unwrap();
        assert_eq!(record.quality_tier, QualityTier::High);
        assert_eq!(record.dimensions, (4, 4));
        assert_eq!(record.byte_size, 64);
    }

    #[tokio::test]
    async fn test_missing_asset_is_none() {
        let f = fixture(QualityTier::High, LoaderConfig::default(), InMemoryAssetSource::new()).await;
        assert!(f.loader.get_image("ghost", None).await.is_none());
        assert_eq!(f.loader.memory_stats().pending_loads, 0);
    }

    #[tokio::test]
    async fn test_requested_quality_selects_variant() {
        let source = InMemoryAssetSource::new();
        source.insert("meter", QualityTier::Low, png(8, 8, [0, 0, 0, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        let bitmap = f.loader.get_image("meter", Some(QualityTier::Low)).await.unwrap();
        assert_eq!(bitmap.dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let source = InMemoryAssetSource::new().with_delay(Duration::from_millis(50));
        source.insert("panel", QualityTier::High, png(4, 4, [9, 9, 9, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        let results = join_all((0..8).map(|_| f.loader.get_image("panel", None))).await;

        assert_eq!(f.source.reads(), 1);
        let first = results[0].clone().unwrap();
        for result in &results {
            assert!(BitmapHandle::ptr_eq(&first, result.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_persists_large_assets_when_enabled() {
        let source = InMemoryAssetSource::new();
        source.insert("big", QualityTier::High, png(4, 4, [1, 1, 1, 255]));
        let config = LoaderConfig {
            min_persist_bytes: 0,
            ..Default::default()
        };
        let f = fixture(QualityTier::High, config, source).await;

        f.loader.get_image("big", None).await.unwrap();
        assert!(f.store.contains(&asset_key("big")).await);

        // Evict from memory; next load comes from the store, not the source
        f.loader.clear_memory_cache();
        f.loader.get_image("big", None).await.unwrap();
        assert_eq!(f.source.reads(), 1);
    }

    #[tokio::test]
    async fn test_small_assets_not_persisted() {
        let source = InMemoryAssetSource::new();
        source.insert("tiny", QualityTier::High, png(2, 2, [1, 1, 1, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        f.loader.get_image("tiny", None).await.unwrap();
        assert!(!f.store.contains(&asset_key("tiny")).await);
    }

    #[tokio::test]
    async fn test_low_tier_device_does_not_persist() {
        let source = InMemoryAssetSource::new();
        source.insert("big", QualityTier::Low, png(4, 4, [1, 1, 1, 255]));
        let config = LoaderConfig {
            min_persist_bytes: 0,
            ..Default::default()
        };
        let f = fixture(QualityTier::Low, config, source).await;

        f.loader.get_image("big", None).await.unwrap();
        assert!(!f.store.contains(&asset_key("big")).await);
    }

    #[tokio::test]
    async fn test_quality_drops_under_pressure() {
        let f = fixture(QualityTier::High, LoaderConfig::default(), InMemoryAssetSource::new()).await;
        assert_eq!(f.loader.current_optimal_quality(), QualityTier::High);

        for i in 0..40 {
            f.render.insert_bitmap(&format!("b{}", i), Bitmap::filled(1, 1, [0; 4]));
        }
        assert_eq!(f.loader.current_optimal_quality(), QualityTier::Medium);

        for i in 40..80 {
            f.render.insert_bitmap(&format!("b{}", i), Bitmap::filled(1, 1, [0; 4]));
        }
        assert_eq!(f.loader.current_optimal_quality(), QualityTier::Low);
    }

    #[tokio::test]
    async fn test_preload_reports_failures() {
        let source = InMemoryAssetSource::new();
        source.insert("a", QualityTier::High, png(2, 2, [0, 0, 0, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        let report = f.loader.preload_critical(["a", "missing"], None).await;
        assert_eq!(report.requested, 2);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed, vec!["missing".to_string()]);
        assert!(report.timed_out.is_empty());
    }

    #[tokio::test]
    async fn test_preload_timeout_is_soft() {
        let source = InMemoryAssetSource::new().with_delay(Duration::from_millis(100));
        source.insert("slow", QualityTier::High, png(2, 2, [0, 0, 0, 255]));
        let config = LoaderConfig {
            preload_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let f = fixture(QualityTier::High, config, source).await;

        let report = f.loader.preload_critical(["slow"], None).await;
        assert_eq!(report.timed_out, vec!["slow".to_string()]);

        // The abandoned load still completes and populates the cache
        tokio::time::sleep(Duration::from_millis(500)).await;
        let stats = f.loader.memory_stats();
        assert_eq!(stats.pending_loads, 0);
        assert_eq!(stats.cached_count, 1);
        assert!(f.render.get_bitmap("slow").is_some());
        assert_eq!(f.source.reads(), 1);

        f.loader.get_image("slow", None).await.unwrap();
        assert_eq!(f.source.reads(), 1);
    }

    #[tokio::test]
    async fn test_warm_up_loads_flagged_assets() {
        let source = InMemoryAssetSource::new();
        source.insert("slow", QualityTier::High, png(2, 2, [0, 0, 0, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        assert_eq!(f.loader.warm_up().await, PreloadReport::default());

        f.monitor.start_operation("asset_load:slow");
        f.clock.advance(Duration::from_millis(150));
        f.monitor.end_operation("asset_load:slow", Metadata::new());

        let report = f.loader.warm_up().await;
        assert_eq!(report.requested, 1);
        assert_eq!(report.loaded, 1);
        assert!(f.render.get_bitmap("slow").is_some());
    }

    #[tokio::test]
    async fn test_clear_memory_cache() {
        let source = InMemoryAssetSource::new();
        source.insert("a", QualityTier::High, png(2, 2, [0, 0, 0, 255]));
        let f = fixture(QualityTier::High, LoaderConfig::default(), source).await;

        f.loader.get_image("a", None).await.unwrap();
        assert_eq!(f.loader.memory_stats().cached_count, 1);

        f.loader.clear_memory_cache();
        let stats = f.loader.memory_stats();
        assert_eq!(stats.cached_count, 0);
        assert_eq!(stats.total_size_mb, 0.0);
        assert!(f.loader.asset_record("a").is_none());
    }
}
