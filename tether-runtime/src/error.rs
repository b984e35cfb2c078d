//! Runtime error types

use tether_config::ConfigError;
use thiserror::Error;

/// Runtime result type
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Supervisor and bootstrap errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The worker could not be started; never retried
    #[error("Boot failed for worker '{worker}': {source:#}")]
    Boot {
        worker: String,
        #[source]
        source: anyhow::Error,
    },

    /// The worker has been shut down and cannot run again
    #[error("Worker '{0}' has been shut down")]
    Terminated(String),

    /// The configuration handed to the bootstrap is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    pub fn boot(worker: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        RuntimeError::Boot {
            worker: worker.into(),
            source: source.into(),
        }
    }

    pub fn is_boot_failure(&self) -> bool {
        matches!(self, RuntimeError::Boot { .. } | RuntimeError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_error_display_includes_cause() {
        let err = RuntimeError::boot("pump", anyhow::anyhow!("no sensor attached"));
        assert!(err.is_boot_failure());
        assert_eq!(
            err.to_string(),
            "Boot failed for worker 'pump': no sensor attached"
        );
        assert!(!RuntimeError::Terminated("pump".into()).is_boot_failure());
    }

    #[test]
    fn test_invalid_config_is_a_boot_failure() {
        let mut config = tether_config::TetherConfig::default();
        config.worker.source = "builtin:pump".to_string();

        let err = RuntimeError::from(config.validate_all().unwrap_err());
        assert!(matches!(err, RuntimeError::Config(_)));
        assert!(err.is_boot_failure());
    }
}
