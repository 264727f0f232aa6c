//! Content Store - Versioned, TTL-gated Record Cache
//!
//! Reads fail closed: anything that cannot be trusted (undecodable bytes,
//! wrong kind, expired, older schema) is reported as absent and purged on
//! the spot. Writes surface errors to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::backend::{InMemoryKvBackend, KvBackend};
use super::record::{CacheRecord, Record, RecordPayload, CURRENT_SCHEMA_VERSION};
use super::{DEFAULT_NAMESPACE, SCHEMA_VERSION_KEY};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{Error, Result};

/// Content store configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix applied to every key written by this store
    pub namespace: String,
    /// Schema version of the running build
    pub schema_version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

/// Aggregate over live records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    /// Number of live records
    pub count: usize,
    /// Serialized size of live records
    pub total_bytes: u64,
    /// `stored_at` of the oldest live record
    pub oldest: Option<DateTime<Utc>>,
    /// `stored_at` of the newest live record
    pub newest: Option<DateTime<Utc>>,
}

/// Persistent content store
pub struct ContentStore {
    backend: Arc<dyn KvBackend>,
    clock: SharedClock,
    config: StoreConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    purges: AtomicU64,
}

impl ContentStore {
    /// Open a store, clearing every record once if the persisted schema
    /// version is older than the running one.
    pub async fn open(
        backend: Arc<dyn KvBackend>,
        clock: SharedClock,
        config: StoreConfig,
    ) -> Result<Self> {
        let store = Self {
            backend,
            clock,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            purges: AtomicU64::new(0),
        };
        store.check_schema_version().await?;
        Ok(store)
    }

    /// Open an in-memory store on the system clock (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::open(
            Arc::new(InMemoryKvBackend::new()),
            Arc::new(SystemClock),
            StoreConfig::default(),
        )
        .await
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.config.namespace, key)
    }

    fn version_key(&self) -> String {
        self.namespaced(SCHEMA_VERSION_KEY)
    }

    async fn stored_schema_version(&self) -> Result<Option<u32>> {
        let raw = self.backend.get(&self.version_key()).await?;
        Ok(raw.and_then(|bytes| serde_json::from_slice::<u32>(&bytes).ok()))
    }

    async fn check_schema_version(&self) -> Result<()> {
        let current = self.config.schema_version;
        match self.stored_schema_version().await? {
            Some(stored) if stored >= current => {
                if stored > current {
                    // Records from a newer build fail the version check on touch
                    warn!(stored, current, "Store was written by a newer schema");
                }
                Ok(())
            }
            stored => {
                let removed = self.clear_all().await?;
                self.backend
                    .put(
                        &self.version_key(),
                        Bytes::from(serde_json::to_vec(&current)?),
                    )
                    .await?;
                info!(
                    previous = ?stored,
                    current,
                    removed,
                    "Schema version updated, store cleared"
                );
                Ok(())
            }
        }
    }

    /// Store `value` at `key` with the given TTL, overwriting any record
    #[instrument(skip(self, value))]
    pub async fn put<T: Record>(&self, key: &str, value: T, ttl: Duration) -> Result<()> {
        let record = CacheRecord::new(
            key,
            value.into_payload(),
            self.clock.now(),
            ttl,
            self.config.schema_version,
        );
        let bytes = serde_json::to_vec(&record)?;
        self.backend.put(&self.namespaced(key), Bytes::from(bytes)).await?;
        debug!(key, ttl_ms = record.ttl_ms, "Stored record");
        Ok(())
    }

    /// Fetch a live record of kind `T`.
    ///
    /// Never fails: backend errors, decode failures, kind mismatches, expiry
    /// and schema mismatches all yield `None`, and stale entries are purged.
    pub async fn get<T: Record>(&self, key: &str) -> Option<T> {
        let record = self.load_live(key).await?;
        match into_typed::<T>(key, record.payload) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Record kind mismatch, purging");
                self.purge(key).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a live record exists at `key` (purges a stale one)
    pub async fn contains(&self, key: &str) -> bool {
        self.load_live(key).await.is_some()
    }

    async fn load_live(&self, key: &str) -> Option<CacheRecord> {
        let raw = match self.backend.get(&self.namespaced(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Store read failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let record = match decode_record(key, &raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "Undecodable record, purging");
                self.purge(key).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if record.schema_version != self.config.schema_version {
            debug!(
                key,
                record_version = record.schema_version,
                "Schema mismatch, purging"
            );
            self.purge(key).await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if record.is_expired(self.clock.now()) {
            debug!(key, "Record expired, purging");
            self.purge(key).await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(record)
    }

    async fn purge(&self, key: &str) {
        match self.backend.delete(&self.namespaced(key)).await {
            Ok(_) => {
                self.purges.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(key, error = %e, "Failed to purge stale record"),
        }
    }

    /// Explicitly remove the record at `key`
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        self.backend.delete(&self.namespaced(key)).await
    }

    /// Remove every record under this store's namespace.
    ///
    /// The schema version marker is kept.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<usize> {
        let version_key = self.version_key();
        let mut removed = 0;
        for key in self.backend.keys(&self.config.namespace).await? {
            if key == version_key {
                continue;
            }
            if self.backend.delete(&key).await? {
                removed += 1;
            }
        }
        info!(removed, "Cleared content store");
        Ok(removed)
    }

    /// Delete every record that is no longer live
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let version_key = self.version_key();
        let mut purged = 0;

        for key in self.backend.keys(&self.config.namespace).await? {
            if key == version_key {
                continue;
            }
            let Some(raw) = self.backend.get(&key).await? else {
                continue;
            };
            let live = decode_record(&key, &raw)
                .map(|r| r.is_live(now, self.config.schema_version))
                .unwrap_or(false);
            if !live && self.backend.delete(&key).await? {
                purged += 1;
            }
        }

        if purged > 0 {
            self.purges.fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged, "Purged expired records");
        }
        Ok(purged)
    }

    /// Read-only aggregate scan over live records
    pub async fn statistics(&self) -> StoreStatistics {
        let now = self.clock.now();
        let version_key = self.version_key();
        let mut stats = StoreStatistics::default();

        let keys = match self.backend.keys(&self.config.namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list store keys");
                return stats;
            }
        };

        for key in keys {
            if key == version_key {
                continue;
            }
            let Ok(Some(raw)) = self.backend.get(&key).await else {
                continue;
            };
            let Ok(record) = decode_record(&key, &raw) else {
                continue;
            };
            if !record.is_live(now, self.config.schema_version) {
                continue;
            }

            stats.count += 1;
            stats.total_bytes += raw.len() as u64;
            stats.oldest = Some(match stats.oldest {
                Some(oldest) => oldest.min(record.stored_at),
                None => record.stored_at,
            });
            stats.newest = Some(match stats.newest {
                Some(newest) => newest.max(record.stored_at),
                None => record.stored_at,
            });
        }

        stats
    }

    /// Running schema version
    pub fn schema_version(&self) -> u32 {
        self.config.schema_version
    }

    /// Hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Miss count (includes purged records)
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of stale records purged
    pub fn purges(&self) -> u64 {
        self.purges.load(Ordering::Relaxed)
    }
}

fn decode_record(key: &str, raw: &[u8]) -> Result<CacheRecord> {
    serde_json::from_slice(raw).map_err(|e| Error::RecordDecode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn into_typed<T: Record>(key: &str, payload: RecordPayload) -> Result<T> {
    T::from_payload(payload).map_err(|found| Error::RecordDecode {
        key: key.to_string(),
        reason: format!("expected {}, found {}", T::KIND, found.kind()),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::record::{ProgressState, TrainingStep};

    fn steps() -> Vec<TrainingStep> {
        vec![TrainingStep {
            index: 0,
            title: "Identify primaries".to_string(),
            instruction: "Tap H1 on each transformer".to_string(),
            highlighted_components: vec!["T1".to_string()],
        }]
    }

    async fn store_with_clock() -> (ContentStore, Arc<ManualClock>, Arc<InMemoryKvBackend>) {
        let clock = Arc::new(ManualClock::starting_now());
        let backend = Arc::new(InMemoryKvBackend::new());
        let store = ContentStore::open(backend.clone(), clock.clone(), StoreConfig::default())
            .await
            .unwrap();
        (store, clock, backend)
    }

    #[tokio::test]
    async fn test_put_get() {
        let (store, _, _) = store_with_clock().await;
        store
            .put("steps:wye", steps(), Duration::from_secs(60))
            .await
            .unwrap();

        let loaded: Option<Vec<TrainingStep>> = store.get("steps:wye").await;
        assert_eq!(loaded, Some(steps()));
        assert_eq!(store.hits(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (store, _, _) = store_with_clock().await;
        store.put("k", steps(), Duration::from_secs(60)).await.unwrap();
        store
            .put("k", Vec::<TrainingStep>::new(), Duration::from_secs(60))
            .await
            .unwrap();

        let loaded: Vec<TrainingStep> = store.get("k").await.unwrap();
        assert!(loaded.is_empty());
        assert_eq!(store.statistics().await.count, 1);
    }

    #[tokio::test]
    async fn test_expired_record_purged() {
        let (store, clock, backend) = store_with_clock().await;
        store.put("k1", steps(), Duration::from_secs(1)).await.unwrap();

        clock.advance(Duration::from_millis(1_100));

        assert!(store.get::<Vec<TrainingStep>>("k1").await.is_none());
        assert!(backend.get("voltcache:k1").await.unwrap().is_none());
        assert_eq!(store.purges(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_purged() {
        let (store, _, backend) = store_with_clock().await;
        backend
            .put("voltcache:broken", Bytes::from_static(b"{not json"))
            .await
            .unwrap();

        assert!(store.get::<Vec<TrainingStep>>("broken").await.is_none());
        assert!(backend.get("voltcache:broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kind_mismatch_purged() {
        let (store, _, _) = store_with_clock().await;
        store.put("k", steps(), Duration::from_secs(60)).await.unwrap();

        assert!(store.get::<ProgressState>("k").await.is_none());
        assert!(!store.contains("k").await);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (store, _, _) = store_with_clock().await;
        store.put("k", steps(), Duration::from_secs(60)).await.unwrap();

        assert!(store.invalidate("k").await.unwrap());
        assert!(!store.invalidate("k").await.unwrap());
        assert!(store.get::<Vec<TrainingStep>>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_statistics_span() {
        let (store, clock, _) = store_with_clock().await;
        let first = clock.now();
        store.put("a", steps(), Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(5));
        store.put("b", steps(), Duration::from_secs(60)).await.unwrap();

        let stats = store.statistics().await;
        assert_eq!(stats.count, 2);
        assert!(stats.total_bytes > 0);
        assert_eq!(stats.oldest, Some(first));
        assert_eq!(stats.newest, Some(first + chrono::Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live() {
        let (store, clock, _) = store_with_clock().await;
        store.put("short", steps(), Duration::from_secs(1)).await.unwrap();
        store.put("long", steps(), Duration::from_secs(600)).await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.contains("long").await);
        assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_version_marker() {
        let (store, _, backend) = store_with_clock().await;
        store.put("a", steps(), Duration::from_secs(60)).await.unwrap();
        store.put("b", steps(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert_eq!(backend.len(), 1);
        assert!(backend
            .get("voltcache:__schema_version")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_unbounded_ttl_is_served() {
        let (store, clock, _) = store_with_clock().await;
        store.put("forever", steps(), Duration::MAX).await.unwrap();
        clock.advance(Duration::from_secs(60 * 60 * 24 * 365));

        assert_eq!(store.get::<Vec<TrainingStep>>("forever").await, Some(steps()));
        assert!(store.contains("forever").await);
        assert_eq!(store.statistics().await.count, 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn test_decode_failures_are_record_decode_errors() {
        let err = decode_record("broken", b"{not json").unwrap_err();
        assert!(matches!(err, Error::RecordDecode { ref key, .. } if key == "broken"));

        let payload = ProgressState {
            diagram_id: "wye-wye".to_string(),
            current_step: 2,
            completed_steps: vec![0, 1],
            mistakes: 0,
            updated_at: Utc::now(),
        }
        .into_payload();
        let err = into_typed::<Vec<TrainingStep>>("k", payload).unwrap_err();
        assert!(matches!(err, Error::RecordDecode { .. }));
        assert!(err.to_string().contains("expected training_steps, found progress_state"));
    }
}
