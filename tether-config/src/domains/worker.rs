//! Worker identity configuration

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};

/// Identity of the hosted worker and the payloads handed to it at boot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name, used for logging and process identity
    pub name: String,

    /// Locator of the worker definition
    pub source: String,

    /// Settings forwarded verbatim to the startup hook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<JsonValue>,

    /// One-shot payload injected into the message handler after `test_delay`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_data: Option<JsonValue>,

    /// Delay before `test_data` is delivered
    #[serde(with = "humantime_serde")]
    pub test_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            source: String::new(),
            settings: None,
            test_data: None,
            test_delay: Duration::from_secs(2),
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_required_string(&self.source, "source", self.domain_name())?;

        if let Some(settings) = &self.settings {
            if !settings.is_object() {
                return Err(self.validation_error("settings must be a JSON object"));
            }
        }

        if let Some(test_data) = &self.test_data {
            if !test_data.is_object() {
                return Err(self.validation_error("test_data must be a JSON object"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}
