//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A JSON payload passed through the environment did not parse
    #[error("{variable} is not valid JSON: {source}")]
    InvalidJson {
        variable: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value in {variable}: {message}")]
    InvalidEnv { variable: String, message: String },

    /// A domain section failed validation
    #[error("Invalid {domain} configuration: {message}")]
    Domain { domain: String, message: String },
}

impl ConfigError {
    /// Name of the domain or variable the error was raised for
    pub fn origin(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidJson { variable, .. } | ConfigError::InvalidEnv { variable, .. } => Some(variable),
            ConfigError::Domain { domain, .. } => Some(domain),
            ConfigError::FileRead { .. } | ConfigError::Parse(_) => None,
        }
    }
}
