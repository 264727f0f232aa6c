//! Performance Monitor & Adaptive Controller
//!
//! Measures operation and frame durations, keeps per-session aggregates,
//! periodically derives a [`PerformanceProfile`] and pushes it to the
//! registered animation drivers. Host lifecycle changes pause and resume
//! drivers and toggle battery saver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bucket::{BucketCounts, PerformanceBucket};
use super::collector::{MetricsCollector, FRAME_MS_BUCKETS, OPERATION_MS_BUCKETS};
use super::driver::{AnimationDriver, DriverId};
use super::lifecycle::{HostLifecycleState, LifecycleListener, ListenerId};
use super::profile::PerformanceProfile;
use super::sink::{Metadata, TelemetrySink, TracingSink};
use crate::assets::QualityTier;
use crate::clock::{elapsed_ms, to_chrono, SharedClock};
use crate::config::serde_duration_ms;

/// Operation name prefix for asset loads; the remainder is the asset name
pub const ASSET_LOAD_PREFIX: &str = "asset_load";

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// How often frame recording recomputes the profile
    #[serde(with = "serde_duration_ms")]
    pub profile_interval: Duration,
    /// Frames longer than this count as dropped
    pub dropped_frame_ms: f64,
    /// Dropped-frame ratio at or above which performance is unacceptable
    pub max_dropped_ratio: f64,
    /// Asset loads slower than this are scheduled for warm-up
    pub slow_asset_load_ms: f64,
    /// Multiplier applied to new animation durations under battery saver
    pub battery_saver_duration_factor: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            profile_interval: Duration::from_secs(5),
            dropped_frame_ms: 16.0,
            max_dropped_ratio: 0.10,
            slow_asset_load_ms: 100.0,
            battery_saver_duration_factor: 2,
        }
    }
}

/// Handler an operation is dispatched to, chosen by name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    DiagramRender,
    ConnectionAnimation,
    AssetLoad,
    StateUpdate,
    Generic,
}

impl OperationKind {
    /// Classify an operation by its name prefix
    pub fn from_name(name: &str) -> Self {
        if name.starts_with("diagram_render") {
            OperationKind::DiagramRender
        } else if name.starts_with("connection_animation") {
            OperationKind::ConnectionAnimation
        } else if name.starts_with(ASSET_LOAD_PREFIX) {
            OperationKind::AssetLoad
        } else if name.starts_with("state_update") {
            OperationKind::StateUpdate
        } else {
            OperationKind::Generic
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            OperationKind::DiagramRender => "diagram_render",
            OperationKind::ConnectionAnimation => "connection_animation",
            OperationKind::AssetLoad => "asset_load",
            OperationKind::StateUpdate => "state_update",
            OperationKind::Generic => "generic",
        }
    }
}

/// Result of a completed operation measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub name: String,
    pub kind: OperationKind,
    pub duration_ms: f64,
    pub bucket: PerformanceBucket,
}

/// Aggregates for one measurement session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// 1000 / mean frame time, or 0 when no frames were recorded
    pub avg_frame_rate: f64,
    pub dropped_frames: u64,
    pub total_frames: u64,
    pub peak_resident_resources: usize,
    pub buckets: BucketCounts,
}

struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    total_frames: u64,
    dropped_frames: u64,
    frame_ms_total: f64,
    peak_resident: usize,
    buckets: BucketCounts,
}

impl Session {
    fn begin(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: now,
            total_frames: 0,
            dropped_frames: 0,
            frame_ms_total: 0.0,
            peak_resident: 0,
            buckets: BucketCounts::default(),
        }
    }

    fn summarize(&self, now: DateTime<Utc>) -> SessionSummary {
        let avg_frame_rate = if self.total_frames == 0 || self.frame_ms_total <= 0.0 {
            0.0
        } else {
            1000.0 / (self.frame_ms_total / self.total_frames as f64)
        };
        SessionSummary {
            session_id: self.id,
            started_at: self.started_at,
            ended_at: now,
            avg_frame_rate,
            dropped_frames: self.dropped_frames,
            total_frames: self.total_frames,
            peak_resident_resources: self.peak_resident,
            buckets: self.buckets,
        }
    }
}

struct MonitorState {
    operations: HashMap<String, DateTime<Utc>>,
    session: Session,
    last_profile_at: DateTime<Utc>,
    lifecycle: HostLifecycleState,
    battery_saver: bool,
    warmup: Vec<String>,
}

/// Performance telemetry and adaptive controller
pub struct PerformanceMonitor {
    config: TelemetryConfig,
    device_tier: QualityTier,
    clock: SharedClock,
    sink: Arc<dyn TelemetrySink>,
    metrics: MetricsCollector,
    state: Mutex<MonitorState>,
    profile: RwLock<PerformanceProfile>,
    drivers: RwLock<HashMap<DriverId, Arc<AnimationDriver>>>,
    listeners: RwLock<HashMap<ListenerId, Arc<dyn LifecycleListener>>>,
    next_id: AtomicU64,
}

impl PerformanceMonitor {
    /// Create a new monitor for a device of the given tier
    pub fn new(config: TelemetryConfig, device_tier: QualityTier, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            config,
            device_tier,
            clock,
            sink: Arc::new(TracingSink),
            metrics: MetricsCollector::new(),
            state: Mutex::new(MonitorState {
                operations: HashMap::new(),
                session: Session::begin(now),
                last_profile_at: now,
                lifecycle: HostLifecycleState::Foregrounded,
                battery_saver: false,
                warmup: Vec::new(),
            }),
            profile: RwLock::new(PerformanceProfile::for_tier(device_tier)),
            drivers: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the telemetry sink
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Begin timing `name`; restarting a running name resets its start
    pub fn start_operation(&self, name: &str) {
        let now = self.clock.now();
        self.state.lock().operations.insert(name.to_string(), now);
    }

    /// Stop timing `name` and dispatch the result.
    ///
    /// Returns `None` if `name` was never started.
    pub fn end_operation(&self, name: &str, metadata: Metadata) -> Option<OperationOutcome> {
        let now = self.clock.now();
        let duration_ms = {
            let mut state = self.state.lock();
            let started = state.operations.remove(name)?;
            let duration_ms = elapsed_ms(started, now) as f64;
            state
                .session
                .buckets
                .record(PerformanceBucket::classify(duration_ms));
            duration_ms
        };

        let outcome = OperationOutcome {
            name: name.to_string(),
            kind: OperationKind::from_name(name),
            duration_ms,
            bucket: PerformanceBucket::classify(duration_ms),
        };

        self.metrics
            .histogram("operation_duration_ms", OPERATION_MS_BUCKETS)
            .observe_ms(duration_ms);
        self.metrics
            .counter(&format!("operations_{}_total", outcome.bucket))
            .inc();
        self.sink.report(name, duration_ms, &metadata);
        self.dispatch(&outcome);

        Some(outcome)
    }

    fn dispatch(&self, outcome: &OperationOutcome) {
        match outcome.kind {
            OperationKind::DiagramRender => {
                if outcome.bucket == PerformanceBucket::Poor {
                    self.metrics.counter("diagram_render_slow_total").inc();
                    warn!(
                        operation = %outcome.name,
                        duration_ms = outcome.duration_ms,
                        "Slow diagram render"
                    );
                }
            }
            OperationKind::ConnectionAnimation => {
                if outcome.duration_ms > self.current_profile().frame_interval_ms() {
                    self.metrics
                        .counter("connection_animation_over_budget_total")
                        .inc();
                    debug!(
                        operation = %outcome.name,
                        duration_ms = outcome.duration_ms,
                        "Connection animation exceeded frame budget"
                    );
                }
            }
            OperationKind::AssetLoad => {
                if outcome.duration_ms > self.config.slow_asset_load_ms {
                    let asset = outcome
                        .name
                        .strip_prefix(ASSET_LOAD_PREFIX)
                        .map(|rest| rest.trim_start_matches(':'))
                        .filter(|rest| !rest.is_empty())
                        .unwrap_or(&outcome.name)
                        .to_string();
                    debug!(asset = %asset, duration_ms = outcome.duration_ms, "Scheduling asset warm-up");
                    let mut state = self.state.lock();
                    if !state.warmup.contains(&asset) {
                        state.warmup.push(asset);
                    }
                }
            }
            OperationKind::StateUpdate => {
                if outcome.bucket != PerformanceBucket::Excellent {
                    self.metrics.counter("state_update_over_budget_total").inc();
                }
            }
            OperationKind::Generic => {}
        }
        self.metrics
            .counter(&format!("operations_{}_total", outcome.kind.as_str()))
            .inc();
    }

    /// Assets flagged as slow since the last call
    pub fn take_warmup_candidates(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().warmup)
    }

    // =========================================================================
    // Frames & profile
    // =========================================================================

    /// Record one rendered frame
    pub fn record_frame(&self, duration_ms: f64) {
        let now = self.clock.now();
        let dropped = duration_ms > self.config.dropped_frame_ms;
        let due = {
            let mut state = self.state.lock();
            let session = &mut state.session;
            session.total_frames += 1;
            session.frame_ms_total += duration_ms.max(0.0);
            if dropped {
                session.dropped_frames += 1;
            }
            now - state.last_profile_at >= to_chrono(self.config.profile_interval)
        };

        self.metrics.counter("frames_total").inc();
        if dropped {
            self.metrics.counter("frames_dropped_total").inc();
        }
        self.metrics
            .histogram("frame_duration_ms", FRAME_MS_BUCKETS)
            .observe_ms(duration_ms);

        if due {
            self.recompute_profile();
        }
    }

    /// Whether fewer than the configured share of frames were dropped
    pub fn is_performance_acceptable(&self) -> bool {
        let state = self.state.lock();
        let session = &state.session;
        if session.total_frames == 0 {
            return true;
        }
        (session.dropped_frames as f64 / session.total_frames as f64) < self.config.max_dropped_ratio
    }

    /// Derive a new profile and push its frame rate to every driver.
    ///
    /// While battery saver is active the reduced rate applies only to
    /// drivers created from then on; registered drivers keep theirs.
    pub fn recompute_profile(&self) -> PerformanceProfile {
        let acceptable = self.is_performance_acceptable();
        let battery_saver = {
            let mut state = self.state.lock();
            state.last_profile_at = self.clock.now();
            state.battery_saver
        };
        let profile = PerformanceProfile::compute(self.device_tier, acceptable, battery_saver);

        let previous = std::mem::replace(&mut *self.profile.write(), profile);
        if previous != profile {
            info!(
                max_frame_rate_hz = profile.max_frame_rate_hz,
                reduced_animations = profile.reduced_animations,
                background_caching = profile.enable_background_caching,
                batch_updates = profile.batch_updates,
                "Performance profile changed"
            );
        }
        self.metrics
            .gauge("profile_max_frame_rate_hz")
            .set(profile.max_frame_rate_hz as u64);

        if !battery_saver {
            for driver in self.drivers.read().values() {
                driver.set_frame_rate_hz(profile.max_frame_rate_hz);
            }
        }
        profile
    }

    /// Profile currently in effect
    pub fn current_profile(&self) -> PerformanceProfile {
        *self.profile.read()
    }

    /// Device tier the monitor was created with
    pub fn device_tier(&self) -> QualityTier {
        self.device_tier
    }

    /// Bucket counts for the current session
    pub fn bucket_counts(&self) -> BucketCounts {
        self.state.lock().session.buckets
    }

    /// Track the render cache's resident count for peak reporting
    pub fn observe_resident_resources(&self, count: usize) {
        {
            let mut state = self.state.lock();
            state.session.peak_resident = state.session.peak_resident.max(count);
        }
        self.metrics.gauge("resident_resources").set(count as u64);
        self.metrics
            .gauge("resident_resources_peak")
            .set_max(count as u64);
    }

    /// Metrics registry
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Discard current aggregates and begin a new session
    pub fn start_session(&self) -> Uuid {
        let mut state = self.state.lock();
        state.session = Session::begin(self.clock.now());
        state.operations.clear();
        debug!(session_id = %state.session.id, "Session started");
        state.session.id
    }

    /// Summarize the current session and begin a new one
    pub fn end_session(&self) -> SessionSummary {
        let now = self.clock.now();
        let summary = {
            let mut state = self.state.lock();
            let summary = state.session.summarize(now);
            state.session = Session::begin(now);
            state.operations.clear();
            summary
        };

        let mut metadata = Metadata::new();
        metadata.insert("session_id".to_string(), summary.session_id.to_string());
        metadata.insert("total_frames".to_string(), summary.total_frames.to_string());
        metadata.insert("dropped_frames".to_string(), summary.dropped_frames.to_string());
        self.sink.report(
            "session_end",
            elapsed_ms(summary.started_at, summary.ended_at) as f64,
            &metadata,
        );
        info!(
            session_id = %summary.session_id,
            avg_frame_rate = summary.avg_frame_rate,
            dropped = summary.dropped_frames,
            total = summary.total_frames,
            "Session ended"
        );
        summary
    }

    // =========================================================================
    // Drivers
    // =========================================================================

    /// Create and register an idle animation driver.
    ///
    /// Under battery saver the duration is multiplied by the configured
    /// factor.
    pub fn create_animation(&self, duration: Duration) -> Arc<AnimationDriver> {
        let duration = if self.battery_saver() {
            duration
                .checked_mul(self.config.battery_saver_duration_factor.max(1))
                .unwrap_or(Duration::MAX)
        } else {
            duration
        };
        let driver = Arc::new(AnimationDriver::new(self.next_id(), duration));
        self.register_driver(driver.clone());
        driver
    }

    /// Allocate a driver id for an externally constructed driver
    pub fn allocate_driver_id(&self) -> DriverId {
        self.next_id()
    }

    /// Add a driver to frame delivery and profile updates
    pub fn register_driver(&self, driver: Arc<AnimationDriver>) {
        driver.set_frame_rate_hz(self.current_profile().max_frame_rate_hz);
        if !self.lifecycle_state().delivers_frames() {
            driver.pause_for_lifecycle();
        }
        self.drivers.write().insert(driver.id(), driver);
    }

    /// Remove a driver; it keeps its current state
    pub fn unregister_driver(&self, id: DriverId) -> Option<Arc<AnimationDriver>> {
        self.drivers.write().remove(&id)
    }

    /// Number of registered drivers
    pub fn driver_count(&self) -> usize {
        self.drivers.read().len()
    }

    /// Deliver one frame of `dt` to every running driver.
    ///
    /// Finished drivers are dropped from the registry. Nothing is delivered
    /// while the host is backgrounded or terminated. Returns the number of
    /// drivers that received the frame.
    pub fn tick(&self, dt: Duration) -> usize {
        if !self.lifecycle_state().delivers_frames() {
            return 0;
        }
        let drivers: Vec<Arc<AnimationDriver>> = self.drivers.read().values().cloned().collect();
        let delivered = drivers.iter().filter(|d| d.deliver_frame(dt)).count();

        let finished: Vec<DriverId> = drivers
            .iter()
            .filter(|d| d.state().is_finished())
            .map(|d| d.id())
            .collect();
        if !finished.is_empty() {
            let mut registry = self.drivers.write();
            for id in finished {
                registry.remove(&id);
            }
        }
        delivered
    }

    // =========================================================================
    // Host lifecycle
    // =========================================================================

    /// Subscribe to lifecycle changes
    pub fn add_lifecycle_listener(&self, listener: Arc<dyn LifecycleListener>) -> ListenerId {
        let id = self.next_id();
        self.listeners.write().insert(id, listener);
        id
    }

    /// Unsubscribe; false if `id` was not subscribed
    pub fn remove_lifecycle_listener(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Current host lifecycle state
    pub fn lifecycle_state(&self) -> HostLifecycleState {
        self.state.lock().lifecycle
    }

    /// Whether battery saver is active
    pub fn battery_saver(&self) -> bool {
        self.state.lock().battery_saver
    }

    /// React to a host lifecycle change
    pub fn on_host_lifecycle_changed(&self, new_state: HostLifecycleState) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.lifecycle;
            state.lifecycle = new_state;
            match new_state {
                HostLifecycleState::Foregrounded => state.battery_saver = false,
                HostLifecycleState::Inactive => state.battery_saver = true,
                HostLifecycleState::Backgrounded | HostLifecycleState::Terminated => {}
            }
            previous
        };

        match new_state {
            HostLifecycleState::Backgrounded | HostLifecycleState::Terminated => {
                let paused = self
                    .drivers
                    .read()
                    .values()
                    .filter(|d| d.pause_for_lifecycle())
                    .count();
                info!(?previous, state = ?new_state, paused, "Host left foreground, drivers paused");
            }
            HostLifecycleState::Foregrounded => {
                let resumed = self
                    .drivers
                    .read()
                    .values()
                    .filter(|d| d.resume_after_lifecycle())
                    .count();
                info!(?previous, resumed, "Host foregrounded, drivers resumed");
                self.recompute_profile();
            }
            HostLifecycleState::Inactive => {
                info!(?previous, "Host inactive, battery saver on");
                self.recompute_profile();
            }
        }

        let listeners: Vec<Arc<dyn LifecycleListener>> =
            self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener.on_lifecycle_changed(new_state);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
