//! Supervisor timing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Restart and shutdown timing for the worker supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay between tearing down a crashed worker and running it again
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,

    /// Grace period between the terminal shutdown notice and process exit
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.restart_delay.is_zero() {
            return Err(self.validation_error("restart_delay must be greater than 0"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}
