//! Performance Telemetry & Adaptive Controller
//!
//! # Architecture
//!
//! ```text
//!   start_operation / end_operation        record_frame
//!               │                               │
//!               ▼                               ▼
//!   ┌────────────────────────────────────────────────────┐
//!   │                PerformanceMonitor                   │
//!   │  buckets · session aggregates · MetricsCollector    │
//!   │            every 5 s: recompute profile             │
//!   └───────┬──────────────────┬─────────────────┬───────┘
//!           ▼                  ▼                 ▼
//!    PerformanceProfile   AnimationDrivers   TelemetrySink
//!   (loader, render cache)  (tick, pause)    (fire & forget)
//! ```

mod bucket;
mod collector;
mod driver;
mod lifecycle;
mod monitor;
mod profile;
mod sink;

pub use bucket::{
    BucketCounts, PerformanceBucket, ACCEPTABLE_BELOW_MS, EXCELLENT_BELOW_MS, GOOD_BELOW_MS,
};
pub use collector::{
    Counter, Gauge, Histogram, HistogramBucket, MetricsCollector, FRAME_MS_BUCKETS,
    OPERATION_MS_BUCKETS,
};
pub use driver::{AnimationDriver, DriverId, DriverState, FrameCallback};
pub use lifecycle::{HostLifecycleState, LifecycleListener, ListenerId};
pub use monitor::{
    OperationKind, OperationOutcome, PerformanceMonitor, SessionSummary, TelemetryConfig,
    ASSET_LOAD_PREFIX,
};
pub use profile::PerformanceProfile;
pub use sink::{Metadata, NullSink, TelemetrySink, TracingSink};
