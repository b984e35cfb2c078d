use anyhow::Result;
use tether_config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build the filter for `directives`, then `RUST_LOG`, then `info`
pub fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives)
        .or_else(|_| {
            eprintln!("Invalid log filter '{}', trying RUST_LOG", directives);
            EnvFilter::try_from_default_env()
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing for a worker process from its logging configuration
pub fn init_worker_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.directives());

    let base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // try_init so tests and embedders that already installed a subscriber keep theirs
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(base.json())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(base.compact())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(base)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    } else {
        tracing::debug!(format = ?config.format, "Worker tracing initialized");
    }

    Ok(())
}

/// Initialize plain stderr tracing at `log_level`
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    init_worker_tracing(&LoggingConfig {
        filter: Some(log_level.to_string()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_directives_fall_back() {
        let filter = build_filter("[[not a filter");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        let config = LoggingConfig::default();
        assert!(init_worker_tracing(&config).is_ok());
        assert!(init_worker_tracing(&config).is_ok());
        assert!(init_simple_tracing("debug").is_ok());
    }
}
