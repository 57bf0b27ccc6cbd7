//! autohome server
//!
//! Loads the configuration, wires devices to conditions and runs the
//! scheduler until Ctrl-C.

use ah_config::AppConfig;
use ah_core::{ConditionError, ConditionResult, FakeSwitch, SwitchProcessor};
use ah_executor::{Scheduler, TickReport};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the config directory
const CONFIG_DIR_ENV: &str = "AUTOHOME_CONFIG_DIR";

/// Resolve the config directory from `--config DIR`, a bare first argument
/// or the environment, in that order. Defaults to the current directory.
fn config_dir(args: &[String], env: Option<String>) -> PathBuf {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(dir) = arg.strip_prefix("--config=") {
            return PathBuf::from(dir);
        }
        if arg == "--config" || arg == "-c" {
            if let Some(dir) = iter.next() {
                return PathBuf::from(dir);
            }
        }
    }

    if let Some(dir) = args.first().filter(|a| !a.starts_with('-')) {
        return PathBuf::from(dir);
    }

    env.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// Connect devices to conditions.
///
/// The LED follows a presence marker file, debounced so a marker that
/// flickers for a single tick does not toggle it.
fn prepare(scheduler: &Scheduler, config_dir: &Path) -> Result<()> {
    let led = Arc::new(FakeSwitch::new("led"));
    let marker = config_dir.join("present");

    scheduler
        .register_named("presence", move || -> ConditionResult<bool> {
            match marker.try_exists() {
                Ok(exists) => Ok(exists),
                Err(e) => Err(ConditionError::Unavailable(e.to_string())),
            }
        })
        .with_threshold(2)?
        .notify_state_processor(SwitchProcessor::new(led));

    Ok(())
}

/// Log a short summary of every tick
async fn log_reports(mut reports: broadcast::Receiver<Arc<TickReport>>) {
    loop {
        match reports.recv().await {
            Ok(report) => debug!(
                tick = report.tick,
                bindings = report.outcomes.len(),
                failed = report.failed().count(),
                over_budget = report.over_budget().count(),
                duration_ms = report.duration.as_millis() as u64,
                "Tick complete"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Tick report listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting autohome");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_dir = config_dir(&args, std::env::var(CONFIG_DIR_ENV).ok());
    info!("Config directory: {:?}", config_dir);

    let config = AppConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {:?}", config_dir))?;

    let scheduler = Scheduler::manual(config.scheduler)?;
    prepare(&scheduler, &config_dir)?;
    tokio::spawn(log_reports(scheduler.subscribe()));
    scheduler.start()?;

    info!(bindings = scheduler.binding_count(), "autohome is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler.stop();

    Ok(())
}
