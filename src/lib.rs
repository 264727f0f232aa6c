//! VoltCache - Adaptive Asset & Render Caching Engine
//!
//! Keeps the wiring-diagram trainer responsive and usable offline by caching
//! content at three levels and steering quality with live frame telemetry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Engine                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Asset     │───▶│    Render    │◀───│ Performance  │       │
//! │  │    Loader    │    │    Cache     │    │   Monitor    │       │
//! │  └──────┬───────┘    └──────────────┘    └──────────────┘       │
//! │         ▼                                                       │
//! │  ┌──────────────┐                                               │
//! │  │   Content    │  (TTL + schema-gated persistent records)      │
//! │  │    Store     │                                               │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`store`] - Persistent content store with expiry and schema gating
//! - [`render`] - Bounded in-memory cache of layers, draw buffers and bitmaps
//! - [`assets`] - Quality-tiered asset loading with request coalescing
//! - [`telemetry`] - Frame/operation timing, profiles and animation drivers
//! - [`engine`] - Composition root and maintenance task
//! - [`config`] - YAML configuration
//! - [`clock`] - Injectable time source
//! - [`error`] - Error types

pub mod assets;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod render;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use assets::{AssetLoader, QualityTier};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, MaintenanceReport};
pub use error::{Error, Result};
pub use render::RenderCache;
pub use store::ContentStore;
pub use telemetry::PerformanceMonitor;
