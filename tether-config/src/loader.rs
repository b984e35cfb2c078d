//! Configuration loading and environment variable handling

use crate::domains::TetherConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate_enum_choice;
use crate::Framing;
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TETHER".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TetherConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.from_yaml_str(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml_str(&self, content: &str) -> ConfigResult<TetherConfig> {
        let mut config: TetherConfig = serde_yaml::from_str(content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TetherConfig> {
        let mut config = TetherConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TetherConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut TetherConfig) -> ConfigResult<()> {
        if let Ok(name) = self.get_env_var("WORKER_NAME") {
            config.worker.name = name;
        }

        if let Ok(source) = self.get_env_var("WORKER_SOURCE") {
            config.worker.source = source;
        }

        if let Ok(settings) = self.get_env_var("WORKER_SETTINGS") {
            config.worker.settings = Some(self.parse_json("WORKER_SETTINGS", &settings)?);
        }

        if let Ok(test_data) = self.get_env_var("TEST_DATA") {
            config.worker.test_data = Some(self.parse_json("TEST_DATA", &test_data)?);
        }

        if let Ok(framing) = self.get_env_var("FRAMING") {
            let normalized = framing.to_lowercase();
            validate_enum_choice(&normalized, &Framing::CHOICES, &self.var_name("FRAMING"), "transport")?;
            config.transport.framing = normalized
                .parse::<Framing>()
                .map_err(|message| self.invalid_env("FRAMING", message))?;
        }

        if let Ok(level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = level
                .parse()
                .map_err(|message| self.invalid_env("LOG_LEVEL", message))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = format
                .parse()
                .map_err(|message| self.invalid_env("LOG_FORMAT", message))?;
        }

        if let Ok(delay) = self.get_env_var("RESTART_DELAY_SECONDS") {
            let seconds: u64 = delay
                .parse()
                .map_err(|e: std::num::ParseIntError| self.invalid_env("RESTART_DELAY_SECONDS", e.to_string()))?;
            config.supervisor.restart_delay = std::time::Duration::from_secs(seconds);
        }

        Ok(())
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(self.var_name(name))
    }

    fn parse_json(&self, name: &str, raw: &str) -> ConfigResult<serde_json::Value> {
        serde_json::from_str(raw).map_err(|source| ConfigError::InvalidJson {
            variable: self.var_name(name),
            source,
        })
    }

    fn invalid_env(&self, name: &str, message: String) -> ConfigError {
        ConfigError::InvalidEnv {
            variable: self.var_name(name),
            message,
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
