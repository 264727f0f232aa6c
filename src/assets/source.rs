//! Raw Asset Storage
//!
//! Read-only access to encoded image files laid out as
//! `<base>/<name><suffix>.<ext>`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::quality::QualityTier;
use crate::error::{Error, Result};

/// Read-only raw asset storage
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Read the encoded bytes at `path`
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Physical path for `name` at `quality`
    fn path_for(&self, name: &str, quality: QualityTier) -> String;
}

/// Asset files in a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryAssetSource {
    base: PathBuf,
    extension: String,
}

impl DirectoryAssetSource {
    /// Create a source rooted at `base` serving `<name><suffix>.<extension>`
    pub fn new(base: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            extension: extension.into(),
        }
    }
}

#[async_trait]
impl AssetSource for DirectoryAssetSource {
    async fn read(&self, path: &str) -> Result<Bytes> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::AssetNotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, name: &str, quality: QualityTier) -> String {
        self.base
            .join(format!("{}{}.{}", name, quality.suffix(), self.extension))
            .to_string_lossy()
            .into_owned()
    }
}

/// In-memory asset source for tests and demos
#[derive(Debug, Default)]
pub struct InMemoryAssetSource {
    files: DashMap<String, Bytes>,
    extension: String,
    delay: Option<Duration>,
    reads: AtomicU64,
}

impl InMemoryAssetSource {
    /// Create an empty source serving `.png` paths
    pub fn new() -> Self {
        Self {
            extension: "png".to_string(),
            ..Default::default()
        }
    }

    /// Delay every read, to widen the window for concurrent requests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add the file for `name` at `quality`
    pub fn insert(&self, name: &str, quality: QualityTier, bytes: impl Into<Bytes>) {
        self.files.insert(self.path_for(name, quality), bytes.into());
    }

    /// Number of reads served, including failed ones
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AssetSource for InMemoryAssetSource {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::AssetNotFound(path.to_string()))
    }

    fn path_for(&self, name: &str, quality: QualityTier) -> String {
        format!("{}{}.{}", name, quality.suffix(), self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_directory_paths() {
        let source = DirectoryAssetSource::new("/assets", "png");
        assert_eq!(source.path_for("breaker", QualityTier::High), "/assets/breaker.png");
        assert_eq!(
            source.path_for("breaker", QualityTier::Low),
            "/assets/breaker_low.png"
        );
    }

    #[tokio::test]
    async fn test_directory_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meter_medium.png"), b"data").unwrap();
        let source = DirectoryAssetSource::new(dir.path(), "png");

        let path = source.path_for("meter", QualityTier::Medium);
        assert_eq!(source.read(&path).await.unwrap(), Bytes::from_static(b"data"));

        let missing = source.path_for("meter", QualityTier::High);
        assert_matches!(source.read(&missing).await, Err(Error::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn test_in_memory_counts_reads() {
        let source = InMemoryAssetSource::new();
        source.insert("a", QualityTier::High, Bytes::from_static(b"x"));

        assert!(source.read("a.png").await.is_ok());
        assert!(source.read("b.png").await.is_err());
        assert_eq!(source.reads(), 2);
    }
}
