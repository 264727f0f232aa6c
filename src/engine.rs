//! Engine - Composition Root
//!
//! Builds the four services once, wires them together and owns the periodic
//! maintenance task.
//!
//! ```text
//!                   ┌──────────────────────┐
//!                   │  PerformanceMonitor  │◀── frames, lifecycle
//!                   └──────────┬───────────┘
//!               profile        │        resident counts
//!          ┌───────────────────┼────────────────────┐
//!          ▼                   ▼                    │
//!   ┌─────────────┐     ┌─────────────┐      ┌──────┴──────┐
//!   │ AssetLoader │────▶│ RenderCache │      │ ContentStore│
//!   └──────┬──────┘     └─────────────┘      └──────▲──────┘
//!          └────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assets::{AssetLoader, AssetSource, InMemoryAssetSource};
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::render::RenderCache;
use crate::store::{ContentStore, InMemoryKvBackend, KvBackend};
use crate::telemetry::{PerformanceMonitor, PerformanceProfile, TelemetrySink, TracingSink};

/// What one maintenance pass did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceReport {
    pub expired_records: usize,
    pub expired_buffers: usize,
    pub warmed_assets: usize,
    pub profile: PerformanceProfile,
}

/// Builder for [`Engine`] with injectable dependencies
pub struct EngineBuilder {
    config: EngineConfig,
    clock: SharedClock,
    backend: Arc<dyn KvBackend>,
    source: Arc<dyn AssetSource>,
    sink: Arc<dyn TelemetrySink>,
}

impl EngineBuilder {
    /// Start from `config` with in-memory storage and the system clock
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            backend: Arc::new(InMemoryKvBackend::new()),
            source: Arc::new(InMemoryAssetSource::new()),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn KvBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn asset_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.source = source;
        self
    }

    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Open the store (running the schema check) and wire every service
    pub async fn build(self) -> Result<Engine> {
        let config = self.config;
        let device_tier = config.device.classify();

        let store = Arc::new(
            ContentStore::open(self.backend, self.clock.clone(), config.store.clone()).await?,
        );
        let monitor = Arc::new(
            PerformanceMonitor::new(config.telemetry.clone(), device_tier, self.clock.clone())
                .with_sink(self.sink),
        );
        let render = Arc::new(
            RenderCache::new(config.render.clone(), self.clock.clone())
                .with_monitor(monitor.clone()),
        );
        let loader = AssetLoader::new(
            config.loader_config(),
            self.source,
            store.clone(),
            render.clone(),
            monitor.clone(),
            self.clock.clone(),
        );

        info!(
            device_tier = %device_tier,
            max_resources = config.render.max_resources,
            schema_version = store.schema_version(),
            "Engine initialized"
        );

        Ok(Engine {
            config,
            clock: self.clock,
            store,
            render,
            loader,
            monitor,
        })
    }
}

/// The caching engine; cloning shares the same services
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    clock: SharedClock,
    store: Arc<ContentStore>,
    render: Arc<RenderCache>,
    loader: AssetLoader,
    monitor: Arc<PerformanceMonitor>,
}

impl Engine {
    /// Start building an engine
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    pub fn render_cache(&self) -> &Arc<RenderCache> {
        &self.render
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// One maintenance pass: purge expired records and draw buffers,
    /// recompute the profile and warm up slow assets.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let expired_records = match self.store.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Store purge failed");
                0
            }
        };
        let expired_buffers = self.render.purge_expired_buffers();
        let profile = self.monitor.recompute_profile();
        let warmed_assets = self.loader.warm_up().await.loaded;

        debug!(
            expired_records,
            expired_buffers,
            warmed_assets,
            "Maintenance pass complete"
        );
        MaintenanceReport {
            expired_records,
            expired_buffers,
            warmed_assets,
            profile,
        }
    }

    /// Run maintenance every `maintenance_interval` until `token` is cancelled
    pub fn spawn_maintenance(&self, token: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        let period = self.config.maintenance_interval;

        tokio::spawn(async move {
            info!(?period, "Starting maintenance task");
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Maintenance task shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        engine.run_maintenance().await;
                    }
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
