//! Persistent Content Store
//!
//! Durable key/value cache of serialized records (training steps, diagram
//! configurations, progress, raw asset bytes) with per-record expiration and
//! schema-version gating.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ContentStore                             │
//! │   put / get<T> / invalidate / clear_all / statistics          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  CacheRecord { payload, stored_at, ttl_ms, schema_version }   │
//! │  (JSON, payload tagged by kind)                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  KvBackend: InMemoryKvBackend │ FileKvBackend                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A record is live iff `now - stored_at < ttl` and its schema version
//! equals the running one. Anything else is treated as absent and purged on
//! the next touch. Opening a store whose persisted schema version is older
//! than the running one clears it once.

mod backend;
mod content;
mod policy;
pub mod record;

pub use backend::{BackendStats, FileKvBackend, InMemoryKvBackend, KvBackend};
pub use content::{ContentStore, StoreConfig, StoreStatistics};
pub use policy::{ContentCategory, TtlPolicy};
pub use record::{
    AssetBytes, CacheRecord, ComponentPlacement, DiagramConfiguration, ProgressState, Record,
    RecordKind, RecordPayload, TrainingStep, WireConnection, CURRENT_SCHEMA_VERSION,
};

/// Prefix applied to every key the store writes
pub const DEFAULT_NAMESPACE: &str = "voltcache:";

/// Key (under the namespace) holding the persisted schema version
pub const SCHEMA_VERSION_KEY: &str = "__schema_version";

/// Key prefix for raw asset bytes
pub const ASSET_KEY_PREFIX: &str = "asset:";

/// Store key for an asset's raw bytes
pub fn asset_key(name: &str) -> String {
    format!("{}{}", ASSET_KEY_PREFIX, name)
}
