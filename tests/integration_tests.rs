//! VoltCache Integration Tests
//!
//! End-to-end behaviour of the engine through its public API:
//! - Persistent store expiry and schema gating
//! - Asset loading, coalescing and quality pressure
//! - Render cache bounds
//! - Frame telemetry and host lifecycle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use voltcache::assets::InMemoryAssetSource;
use voltcache::clock::ManualClock;
use voltcache::{Engine, EngineConfig, QualityTier};

/// Encode a solid-colour PNG
fn png(width: u32, height: u32) -> Bytes {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 80, 120, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

async fn engine_with(
    config: EngineConfig,
    source: Arc<InMemoryAssetSource>,
) -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let engine = Engine::builder(config)
        .clock(clock.clone())
        .asset_source(source)
        .telemetry_sink(Arc::new(voltcache::telemetry::NullSink))
        .build()
        .await
        .unwrap();
    (engine, clock)
}

// =============================================================================
// Persistent Content Store
// =============================================================================

mod store_tests {
    use super::*;
    use voltcache::store::{
        ContentStore, InMemoryKvBackend, KvBackend, ProgressState, StoreConfig, TrainingStep,
    };

    fn step(id: &str) -> TrainingStep {
        TrainingStep {
            index: id.parse().unwrap_or(0),
            title: format!("Step {}", id),
            instruction: "Connect L1 to the breaker".to_string(),
            highlighted_components: vec!["breaker".to_string()],
        }
    }

    #[tokio::test]
    async fn test_ttl_scenario() {
        let (engine, clock) = engine_with(
            EngineConfig::default(),
            Arc::new(InMemoryAssetSource::new()),
        )
        .await;
        let store = engine.store();
        let payload = vec![step("1"), step("2")];

        store
            .put("k1", payload.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.get::<Vec<TrainingStep>>("k1").await, Some(payload));
        assert_eq!(store.statistics().await.count, 1);

        clock.advance(Duration::from_millis(1100));
        assert_eq!(store.get::<Vec<TrainingStep>>("k1").await, None);
        assert_eq!(store.statistics().await.count, 0);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_absent() {
        let store = ContentStore::in_memory().await.unwrap();
        store
            .put("k", vec![step("1")], Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.get::<ProgressState>("k").await.is_none());
        assert!(store.get::<Vec<TrainingStep>>("k").await.is_some());
    }

    #[tokio::test]
    async fn test_version_gated_clear() {
        let backend = Arc::new(InMemoryKvBackend::new());
        let clock = Arc::new(ManualClock::starting_now());

        let v1 = StoreConfig {
            schema_version: 1,
            ..Default::default()
        };
        let store = ContentStore::open(backend.clone(), clock.clone(), v1.clone())
            .await
            .unwrap();
        for i in 0..10 {
            store
                .put(&format!("k{}", i), vec![step("x")], Duration::from_secs(3600))
                .await
                .unwrap();
        }
        drop(store);

        // Reopening at the same version keeps everything and writes nothing
        let writes_before = backend.stats().writes;
        let store = ContentStore::open(backend.clone(), clock.clone(), v1)
            .await
            .unwrap();
        assert_eq!(store.statistics().await.count, 10);
        assert_eq!(backend.stats().writes, writes_before);
        drop(store);

        let v2 = StoreConfig {
            schema_version: 2,
            ..Default::default()
        };
        let store = ContentStore::open(backend.clone(), clock.clone(), v2.clone())
            .await
            .unwrap();
        assert_eq!(store.statistics().await.count, 0);
        assert_eq!(backend.stats().writes, writes_before + 1);
        assert_eq!(backend.len(), 1);
        drop(store);

        // The new version was persisted exactly once
        let store = ContentStore::open(backend.clone(), clock, v2).await.unwrap();
        assert_eq!(backend.stats().writes, writes_before + 1);
        assert_eq!(store.schema_version(), 2);
    }

    #[tokio::test]
    async fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::starting_now());

        {
            let backend = voltcache::store::FileKvBackend::open(dir.path()).await.unwrap();
            let store =
                ContentStore::open(Arc::new(backend), clock.clone(), StoreConfig::default())
                    .await
                    .unwrap();
            store
                .put("steps", vec![step("1")], Duration::from_secs(60))
                .await
                .unwrap();
        }

        let backend = voltcache::store::FileKvBackend::open(dir.path()).await.unwrap();
        let store = ContentStore::open(Arc::new(backend), clock, StoreConfig::default())
            .await
            .unwrap();
        assert_eq!(
            store.get::<Vec<TrainingStep>>("steps").await,
            Some(vec![step("1")])
        );
    }
}

// =============================================================================
// Asset Loading
// =============================================================================

mod asset_tests {
    use super::*;
    use voltcache::render::{Bitmap, BitmapHandle};

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let source = Arc::new(InMemoryAssetSource::new().with_delay(Duration::from_millis(50)));
        source.insert("breaker", QualityTier::Medium, png(16, 16));
        let (engine, _clock) = engine_with(EngineConfig::default(), source.clone()).await;

        let loads = (0..10).map(|_| {
            let loader = engine.loader().clone();
            tokio::spawn(async move { loader.get_image("breaker", None).await })
        });
        let handles: Vec<BitmapHandle> = futures::future::join_all(loads)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(source.reads(), 1);
        for handle in &handles[1..] {
            assert!(BitmapHandle::ptr_eq(&handles[0], handle));
            assert_eq!(handle.pixels(), handles[0].pixels());
        }
    }

    #[tokio::test]
    async fn test_coalesced_failure_reaches_every_waiter() {
        let source = Arc::new(InMemoryAssetSource::new().with_delay(Duration::from_millis(50)));
        source.insert(
            "corrupt",
            QualityTier::Medium,
            Bytes::from_static(b"definitely not a png"),
        );
        let (engine, _clock) = engine_with(EngineConfig::default(), source.clone()).await;

        let loads = (0..8).map(|_| {
            let loader = engine.loader().clone();
            tokio::spawn(async move { loader.get_image("corrupt", None).await })
        });
        let results = futures::future::join_all(loads).await;

        assert_eq!(source.reads(), 1);
        assert!(results.into_iter().all(|r| r.unwrap().is_none()));
        assert_eq!(engine.loader().memory_stats().pending_loads, 0);
        assert_eq!(engine.loader().memory_stats().cached_count, 0);
        assert!(engine.loader().asset_record("corrupt").is_none());
    }

    #[tokio::test]
    async fn test_missing_asset_is_none() {
        let (engine, _clock) =
            engine_with(EngineConfig::default(), Arc::new(InMemoryAssetSource::new())).await;

        assert!(engine.loader().get_image("ghost", None).await.is_none());
        assert_eq!(engine.loader().memory_stats().pending_loads, 0);
    }

    #[tokio::test]
    async fn test_quality_downgrades_under_pressure() {
        let (engine, _clock) =
            engine_with(EngineConfig::default(), Arc::new(InMemoryAssetSource::new())).await;
        let loader = engine.loader();
        let few = loader.current_optimal_quality();

        for i in 0..voltcache::assets::LOW_QUALITY_BITMAP_COUNT {
            engine
                .render_cache()
                .insert_bitmap(&format!("filler{}", i), Bitmap::filled(1, 1, [0, 0, 0, 0]));
        }
        let many = loader.current_optimal_quality();

        assert_eq!(engine.monitor().device_tier(), QualityTier::Medium);
        assert!(many < few);
        assert_eq!(many, QualityTier::Low);
    }

    #[tokio::test]
    async fn test_offline_after_memory_clear() {
        let source = Arc::new(InMemoryAssetSource::new());
        source.insert("meter", QualityTier::Medium, png(8, 8));
        let mut config = EngineConfig::default();
        config.loader.min_persist_bytes = 0;
        let (engine, _clock) = engine_with(config, source.clone()).await;

        let report = engine.loader().preload_critical(["meter"], None).await;
        assert_eq!(report.loaded, 1);

        engine.loader().clear_memory_cache();
        assert_eq!(engine.loader().memory_stats().cached_count, 0);

        // Served from the persistent store without touching the source
        let handle = engine.loader().get_image("meter", None).await.unwrap();
        assert_eq!(handle.dimensions(), (8, 8));
        assert_eq!(source.reads(), 1);
    }
}

// =============================================================================
// Render Cache
// =============================================================================

mod render_tests {
    use super::*;
    use kurbo::Size;
    use voltcache::render::{DrawBuffer, LayerRole, Rgba};

    #[tokio::test]
    async fn test_eviction_bound() {
        let mut config = EngineConfig::default();
        config.render.max_resources = 10;
        let (engine, clock) = engine_with(config, Arc::new(InMemoryAssetSource::new())).await;
        let cache = engine.render_cache();

        for i in 0..15 {
            cache.cache_draw_buffer(&format!("buf{:02}", i), || {
                DrawBuffer::builder(Size::new(10.0, 10.0)).clear(Rgba::WHITE).finish()
            });
            clock.advance(Duration::from_millis(10));
        }

        assert_eq!(cache.resident_count(), 10);
        assert_eq!(cache.evictions(), 5);
        let retained: Vec<String> = cache.resources().into_iter().map(|r| r.id).collect();
        let expected: Vec<String> = (5..15).map(|i| format!("buf{:02}", i)).collect();
        assert_eq!(retained, expected);
    }

    #[tokio::test]
    async fn test_static_layer_reused_until_dirty() {
        let (engine, _clock) =
            engine_with(EngineConfig::default(), Arc::new(InMemoryAssetSource::new())).await;
        let cache = engine.render_cache();
        let set = cache.get_or_create_layer_set("panel-a", Size::new(320.0, 240.0));

        let static_id = set.static_layer.id.clone();
        assert!(cache.layer_needs_rebuild(&static_id));

        let content = Arc::new(
            DrawBuffer::builder(Size::new(320.0, 240.0))
                .clear(Rgba::WHITE)
                .finish(),
        );
        cache.commit_layer(&static_id, content);
        assert!(!cache.layer_needs_rebuild(&static_id));
        assert!(cache.layer_needs_rebuild(&set.dynamic_layer.id));

        cache.mark_layer_dirty(&static_id);
        assert!(cache.layer_needs_rebuild(&static_id));
        assert_eq!(set.static_layer.role, LayerRole::Static);
    }
}

// =============================================================================
// Telemetry
// =============================================================================

mod telemetry_tests {
    use super::*;
    use voltcache::telemetry::{
        AnimationDriver, DriverState, HostLifecycleState, PerformanceBucket,
    };

    #[test]
    fn test_frame_bucketing() {
        assert_eq!(PerformanceBucket::classify(10.0), PerformanceBucket::Excellent);
        assert_eq!(PerformanceBucket::classify(25.0), PerformanceBucket::Good);
        assert_eq!(PerformanceBucket::classify(40.0), PerformanceBucket::Acceptable);
        assert_eq!(PerformanceBucket::classify(80.0), PerformanceBucket::Poor);
    }

    #[tokio::test]
    async fn test_dropped_frames_degrade_profile() {
        let (engine, _clock) =
            engine_with(EngineConfig::default(), Arc::new(InMemoryAssetSource::new())).await;
        let monitor = engine.monitor();

        for _ in 0..80 {
            monitor.record_frame(12.0);
        }
        for _ in 0..20 {
            monitor.record_frame(40.0);
        }

        assert!(!monitor.is_performance_acceptable());
        let profile = monitor.recompute_profile();
        assert!(profile.reduced_animations);
        assert!(profile.batch_updates);

        let summary = monitor.end_session();
        assert_eq!(summary.total_frames, 100);
        assert_eq!(summary.dropped_frames, 20);
    }

    #[tokio::test]
    async fn test_lifecycle_pause() {
        let (engine, _clock) =
            engine_with(EngineConfig::default(), Arc::new(InMemoryAssetSource::new())).await;
        let monitor = engine.monitor();

        let frames = Arc::new(AtomicU64::new(0));
        let mut drivers = Vec::new();
        for _ in 0..3 {
            let counter = frames.clone();
            let driver = Arc::new(
                AnimationDriver::new(monitor.allocate_driver_id(), Duration::from_secs(10))
                    .with_frame_callback(Arc::new(move |_| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })),
            );
            monitor.register_driver(driver.clone());
            driver.start().unwrap();
            drivers.push(driver);
        }

        assert_eq!(monitor.tick(Duration::from_millis(16)), 3);
        assert_eq!(frames.load(Ordering::Relaxed), 3);

        monitor.on_host_lifecycle_changed(HostLifecycleState::Backgrounded);
        assert!(drivers.iter().all(|d| d.state() == DriverState::Idle));
        for _ in 0..5 {
            assert_eq!(monitor.tick(Duration::from_millis(16)), 0);
        }
        assert_eq!(frames.load(Ordering::Relaxed), 3);

        monitor.on_host_lifecycle_changed(HostLifecycleState::Foregrounded);
        assert!(drivers.iter().all(|d| d.state() == DriverState::Running));
        assert_eq!(monitor.tick(Duration::from_millis(16)), 3);
        assert_eq!(frames.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn test_slow_asset_load_triggers_warm_up() {
        let source = Arc::new(InMemoryAssetSource::new());
        source.insert("panel", QualityTier::Medium, png(4, 4));
        let (engine, clock) = engine_with(EngineConfig::default(), source.clone()).await;
        let monitor = engine.monitor();

        monitor.start_operation("asset_load:panel");
        clock.advance(Duration::from_millis(250));
        monitor.end_operation("asset_load:panel", Default::default());

        let report = engine.run_maintenance().await;
        assert_eq!(report.warmed_assets, 1);
        assert!(engine.render_cache().get_bitmap("panel").is_some());
    }
}
