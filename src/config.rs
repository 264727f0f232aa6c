//! Engine Configuration
//!
//! Every component carries its own config struct with sensible defaults;
//! [`EngineConfig`] aggregates them and can be loaded from a YAML file in
//! which every section and field is optional.
//!
//! ```yaml
//! store:
//!   namespace: "voltcache:"
//! ttl:
//!   computed: 600000        # milliseconds
//! render:
//!   max_resources: 150
//! device:
//!   pixel_ratio: 3.0
//!   logical_width: 428
//! maintenance_interval: 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::assets::{DeviceProfile, LoaderConfig};
use crate::error::Result;
use crate::render::RenderCacheConfig;
use crate::store::{StoreConfig, TtlPolicy};
use crate::telemetry::TelemetryConfig;

/// Default period of the maintenance task
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Aggregate engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub ttl: TtlPolicy,
    pub render: RenderCacheConfig,
    pub loader: LoaderConfig,
    pub telemetry: TelemetryConfig,
    pub device: DeviceProfile,
    /// Period of the expiry/purge/profile maintenance task
    #[serde(with = "serde_duration_ms")]
    pub maintenance_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            ttl: TtlPolicy::default(),
            render: RenderCacheConfig::default(),
            loader: LoaderConfig::default(),
            telemetry: TelemetryConfig::default(),
            device: DeviceProfile::default(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Parse from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load from a YAML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Loader configuration with the asset TTL taken from the TTL policy
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            asset_ttl: self.ttl.asset,
            ..self.loader.clone()
        }
    }
}

/// (De)serialize a `Duration` as integer milliseconds
pub mod serde_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::QualityTier;
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_yaml() {
        let config = EngineConfig::from_yaml(
            "render:\n  max_resources: 150\ndevice:\n  pixel_ratio: 3.0\n  logical_width: 428\nmaintenance_interval: 1000\n",
        )
        .unwrap();

        assert_eq!(config.render.max_resources, 150);
        assert_eq!(config.render.draw_buffer_lifetime, Duration::from_secs(300));
        assert_eq!(config.device.classify(), QualityTier::High);
        assert_eq!(config.maintenance_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_loader_config_takes_asset_ttl() {
        let config = EngineConfig::from_yaml("ttl:\n  asset: 60000\n").unwrap();
        assert_eq!(config.loader_config().asset_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_yaml() {
        assert_matches!(
            EngineConfig::from_yaml("render: [1, 2"),
            Err(crate::error::Error::Config(_))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voltcache.yaml");
        std::fs::write(&path, "telemetry:\n  profile_interval: 2000\n").unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.telemetry.profile_interval, Duration::from_secs(2));
    }
}
