//! Domain-specific configuration modules

pub mod logging;
pub mod supervisor;
pub mod transport;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Tether configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TetherConfig {
    /// Worker identity and boot payloads
    pub worker: worker::WorkerConfig,

    /// Wire framing and stream handling
    pub transport: transport::TransportConfig,

    /// Restart and shutdown timing
    pub supervisor: supervisor::SupervisorConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl TetherConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.worker.validate()?;
        self.transport.validate()?;
        self.supervisor.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TetherConfig {
            worker: worker::WorkerConfig {
                name: "thermostat".to_string(),
                source: "builtin:thermostat".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
