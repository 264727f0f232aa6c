//! Expiration Policy
//!
//! The store itself is category-agnostic: callers pick a TTL at `put` time.
//! [`TtlPolicy`] names the defaults the trainer uses for each kind of
//! content.

use std::time::Duration;

use serde::Deserialize;

use crate::config::serde_duration_ms;

/// Broad lifetime class of stored content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    /// Long-lived reference content (training steps, diagram layouts)
    Reference,
    /// Short-lived computed content
    Computed,
    /// Trainee progress
    Progress,
    /// Raw asset bytes
    Asset,
}

/// Per-category TTL defaults
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    #[serde(with = "serde_duration_ms")]
    pub reference: Duration,
    #[serde(with = "serde_duration_ms")]
    pub computed: Duration,
    #[serde(with = "serde_duration_ms")]
    pub progress: Duration,
    #[serde(with = "serde_duration_ms")]
    pub asset: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            reference: Duration::from_secs(7 * 24 * 3600),
            computed: Duration::from_secs(3600),
            progress: Duration::from_secs(30 * 24 * 3600),
            asset: Duration::from_secs(24 * 3600),
        }
    }
}

impl TtlPolicy {
    /// TTL for a category
    pub fn ttl_for(&self, category: ContentCategory) -> Duration {
        match category {
            ContentCategory::Reference => self.reference,
            ContentCategory::Computed => self.computed,
            ContentCategory::Progress => self.progress,
            ContentCategory::Asset => self.asset,
        }
    }
}
