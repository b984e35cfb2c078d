use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tether_config::{ConfigLoader, LogLevel, TetherConfig};
use tether_logging::{init_simple_tracing, init_worker_tracing};
use tether_runtime::{boot, BootOutcome, Worker};
use tracing::{error, info};

mod cli;
mod thermostat;

use cli::Cli;
use thermostat::Thermostat;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_sample_config {
        print!("{}", TetherConfig::generate_sample());
        return ExitCode::SUCCESS;
    }

    let fallback_level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
    match run(cli) {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            // keeps the configured subscriber when one is already installed
            if init_simple_tracing(&fallback_level).is_err() {
                eprintln!("Error: {:#}", e);
            }
            error!("{:#}", e);
            ExitCode::from(BootOutcome::Failed)
        }
    }
}

fn run(cli: Cli) -> Result<BootOutcome> {
    let mut config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("Failed to load configuration")?;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
        config.logging.filter = None;
    }
    init_worker_tracing(&config.logging)?;

    let worker = worker_for(&config)?;
    info!(source = %config.worker.source, "Resolved worker");

    // stdin is read on a blocking thread that never returns on its own
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let outcome = runtime.block_on(boot(worker, config));
    runtime.shutdown_timeout(Duration::from_millis(100));

    Ok(outcome)
}

/// Resolve the worker named by `worker.source`
fn worker_for(config: &TetherConfig) -> Result<Arc<dyn Worker>> {
    match config.worker.source.as_str() {
        "builtin:thermostat" | "thermostat" => {
            let thermostat = Thermostat::from_settings(config.worker.settings.as_ref())?;
            Ok(Arc::new(thermostat))
        }
        other => anyhow::bail!("Unknown worker source '{}'", other),
    }
}
