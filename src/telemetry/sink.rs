//! Telemetry Sinks
//!
//! Fire-and-forget destination for measured events. Implementations must not
//! block; the monitor calls them inline.

use std::collections::BTreeMap;

use tracing::debug;

/// Free-form event metadata
pub type Metadata = BTreeMap<String, String>;

/// Destination for telemetry events
pub trait TelemetrySink: Send + Sync {
    fn report(&self, event: &str, duration_ms: f64, metadata: &Metadata);
}

/// Sink that emits events as `tracing` debug records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn report(&self, event: &str, duration_ms: f64, metadata: &Metadata) {
        debug!(
            target: "voltcache::telemetry",
            event,
            duration_ms,
            metadata = ?metadata,
            "Telemetry event"
        );
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn report(&self, _event: &str, _duration_ms: f64, _metadata: &Metadata) {}
}
