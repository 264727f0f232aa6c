//! VoltCache CLI
//!
//! Operator tool around the caching engine: preload assets into the
//! persistent store, inspect statistics, clear or purge the store, and
//! replay synthetic frame timings through the performance monitor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          voltcache                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Directory   │───▶│    Engine    │───▶│  FileKv      │       │
//! │  │ AssetSource  │    │              │    │  Backend     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voltcache::assets::{DirectoryAssetSource, QualityTier};
use voltcache::store::FileKvBackend;
use voltcache::telemetry::HostLifecycleState;
use voltcache::{Engine, EngineConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// VoltCache - adaptive asset and render cache for the wiring-diagram trainer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the persistent content store
    #[arg(long, env = "VOLTCACHE_STORE_DIR", default_value = ".voltcache")]
    store_dir: PathBuf,

    /// Directory holding raw asset images
    #[arg(long, env = "VOLTCACHE_ASSETS_DIR", default_value = "assets")]
    assets_dir: PathBuf,

    /// Asset file extension
    #[arg(long, env = "VOLTCACHE_ASSET_EXT", default_value = "png")]
    asset_ext: String,

    /// Optional YAML configuration file
    #[arg(long, env = "VOLTCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load assets and persist their bytes for offline use
    Preload {
        /// Asset names (without suffix or extension)
        #[arg(required = true)]
        names: Vec<String>,

        /// Force a quality tier instead of the device-derived one
        #[arg(long, value_enum)]
        quality: Option<QualityTier>,
    },

    /// Print store and render-cache statistics as JSON
    Stats,

    /// Remove every record from the persistent store
    Clear,

    /// Remove expired and stale records from the persistent store
    Purge,

    /// Replay synthetic frame timings; prints the session summary and metrics
    Simulate {
        /// Number of frames to record
        #[arg(long, default_value = "600")]
        frames: u32,

        /// Duration of each frame in milliseconds
        #[arg(long, default_value = "16.0")]
        frame_ms: f64,

        /// Put the host into the inactive state first (battery saver)
        #[arg(long)]
        battery_saver: bool,
    },
}

#[derive(Serialize)]
struct StatsOutput {
    store: voltcache::store::StoreStatistics,
    render: voltcache::render::RenderCacheStats,
    profile: voltcache::telemetry::PerformanceProfile,
    device_tier: QualityTier,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    info!("Starting VoltCache");
    info!("  Store dir: {}", args.store_dir.display());
    info!("  Assets dir: {}", args.assets_dir.display());

    let backend = FileKvBackend::open(&args.store_dir)
        .await
        .with_context(|| format!("opening store at {}", args.store_dir.display()))?;
    let source = DirectoryAssetSource::new(&args.assets_dir, &args.asset_ext);

    let engine = Engine::builder(config)
        .backend(Arc::new(backend))
        .asset_source(Arc::new(source))
        .build()
        .await
        .context("building engine")?;

    match args.command {
        Command::Preload { names, quality } => {
            let report = engine.loader().preload_critical(names, quality).await;
            print_json(&report)?;
        }
        Command::Stats => {
            let output = StatsOutput {
                store: engine.store().statistics().await,
                render: engine.render_cache().stats(),
                profile: engine.monitor().current_profile(),
                device_tier: engine.monitor().device_tier(),
            };
            print_json(&output)?;
        }
        Command::Clear => {
            let removed = engine.store().clear_all().await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Command::Purge => {
            let purged = engine.store().purge_expired().await?;
            print_json(&serde_json::json!({ "purged": purged }))?;
        }
        Command::Simulate {
            frames,
            frame_ms,
            battery_saver,
        } => {
            let monitor = engine.monitor();
            if battery_saver {
                monitor.on_host_lifecycle_changed(HostLifecycleState::Inactive);
            }
            monitor.start_session();
            let animation = monitor.create_animation(Duration::from_millis(
                (f64::from(frames) * frame_ms) as u64,
            ));
            animation.start()?;

            for _ in 0..frames {
                monitor.record_frame(frame_ms);
                monitor.tick(Duration::from_secs_f64(frame_ms.max(0.0) / 1000.0));
            }

            let profile = monitor.recompute_profile();
            let summary = monitor.end_session();
            print_json(&serde_json::json!({
                "summary": summary,
                "profile": profile,
                "animation_state": animation.state().to_string(),
            }))?;
            print!("{}", monitor.metrics().export_text());
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = log_filter(EnvFilter::from_default_env(), parse_level(&args.log_level));

    // Logs go to stderr so stdout stays machine-readable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `base` plus the requested level for every target
fn log_filter(base: EnvFilter, level: Level) -> EnvFilter {
    base.add_directive(level.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_log_level_applies_to_every_target() {
        let filter = log_filter(EnvFilter::new(""), Level::ERROR);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));

        let filter = log_filter(EnvFilter::new(""), Level::WARN);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }
}
