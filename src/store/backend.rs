//! Key/Value Storage Backends
//!
//! The content store persists serialized records through a pluggable
//! [`KvBackend`]. Two implementations ship with the crate:
//!
//! - [`InMemoryKvBackend`] - DashMap-backed, for tests and ephemeral sessions
//! - [`FileKvBackend`] - one JSON file per key inside a cache directory

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{Error, Result};

/// Persistent key/value backend
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read the value stored at `key`
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` at `key`, replacing any previous value
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Delete `key`; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List every key starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Operation counters
    fn stats(&self) -> BackendStats;
}

/// Backend operation counters
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

#[derive(Debug, Default)]
struct OpCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl OpCounters {
    fn snapshot(&self) -> BackendStats {
        BackendStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// In-memory backend, lock-free via DashMap
#[derive(Debug, Default)]
pub struct InMemoryKvBackend {
    storage: DashMap<String, Bytes>,
    counters: OpCounters,
}

impl InMemoryKvBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the backend holds no keys
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl KvBackend for InMemoryKvBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.storage.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .storage
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }

    fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }
}

// =============================================================================
// File Backend
// =============================================================================

/// Directory-backed store: each key is a file named by its URL-safe base64
/// encoding, so arbitrary keys map to portable file names.
#[derive(Debug)]
pub struct FileKvBackend {
    dir: PathBuf,
    counters: OpCounters,
}

impl FileKvBackend {
    /// Open (creating if needed) a backend rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            counters: OpCounters::default(),
        })
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }

    fn key_from_file_name(name: &str) -> Option<String> {
        let stem = name.strip_suffix(".json")?;
        let raw = URL_SAFE_NO_PAD.decode(stem).ok()?;
        String::from_utf8(raw).ok()
    }
}

#[async_trait]
impl KvBackend for FileKvBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(backend_error("read", &path, e)),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(key);
        // Write-then-rename so readers never observe a torn record
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &value)
            .await
            .map_err(|e| backend_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| backend_error("rename", &path, e))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(backend_error("delete", &path, e)),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| backend_error("list", &self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| backend_error("list", &self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match Self::key_from_file_name(name) {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                Some(_) => {}
                None => debug!(file = name, "Skipping foreign file in store directory"),
            }
        }
        Ok(keys)
    }

    fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }
}

fn backend_error(op: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Backend(format!("{} {}: {}", op, path.display(), e))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let backend = InMemoryKvBackend::new();
        backend.put("a:1", Bytes::from_static(b"one")).await.unwrap();
        backend.put("b:1", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(
            backend.get("a:1").await.unwrap(),
            Some(Bytes::from_static(b"one"))
        );
        assert_eq!(backend.keys("a:").await.unwrap(), vec!["a:1".to_string()]);

        assert!(backend.delete("a:1").await.unwrap());
        assert!(!backend.delete("a:1").await.unwrap());
        assert_eq!(backend.len(), 1);

        let stats = backend.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.deletes, 2);
    }

    #[tokio::test]
    async fn test_file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileKvBackend::open(dir.path().join("store")).await.unwrap();

        backend
            .put("voltcache:asset:panel/main", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(
            backend.get("voltcache:asset:panel/main").await.unwrap(),
            Some(Bytes::from_static(b"{}"))
        );
        assert_eq!(backend.get("missing").await.unwrap(), None);

        let keys = backend.keys("voltcache:").await.unwrap();
        assert_eq!(keys, vec!["voltcache:asset:panel/main".to_string()]);

        assert!(backend.delete("voltcache:asset:panel/main").await.unwrap());
        assert!(backend.keys("voltcache:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backend_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileKvBackend::open(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("README"), b"hi").await.unwrap();

        assert!(backend.keys("").await.unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_stats_count_operations() {
        let backend = InMemoryKvBackend::new();
        tokio_test::block_on(async {
            backend.put("k", Bytes::from_static(b"v")).await.unwrap();
            backend.get("k").await.unwrap();
            backend.get("missing").await.unwrap();
            assert!(backend.delete("k").await.unwrap());
        });

        let stats = backend.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.deletes, 1);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_file_backend_io_failure_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileKvBackend::open(dir.path()).await.unwrap();

        // A directory where the record file should be cannot be read as one
        tokio::fs::create_dir(backend.path_for("blocked")).await.unwrap();

        let err = backend.get("blocked").await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)), "unexpected error: {}", err);
        assert!(err.to_string().contains("read"));
    }
}
