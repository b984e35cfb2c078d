//! Transport configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tether_resilience::BackoffConfig;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Wire framing used on the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One compact JSON object per line, terminated by `\r\n`
    #[default]
    Line,
    /// Objects written back to back, split on brace balance
    Concatenated,
}

impl Framing {
    pub const CHOICES: [&'static str; 2] = ["line", "concatenated"];
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Line => write!(f, "line"),
            Framing::Concatenated => write!(f, "concatenated"),
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(Framing::Line),
            "concatenated" | "concat" => Ok(Framing::Concatenated),
            _ => Err(format!("Invalid framing: {}", s)),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Framing variant for both directions
    pub framing: Framing,

    /// Bytes requested per read
    pub read_chunk_size: usize,

    /// Largest inbound frame kept in memory; longer frames are discarded
    pub max_frame_size: usize,

    /// Retry policy while the input stream reports end-of-stream
    pub eof_backoff: BackoffConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Line,
            read_chunk_size: 2048,
            max_frame_size: 64 * 1024,
            eof_backoff: BackoffConfig::default(),
        }
    }
}

impl Validatable for TransportConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.read_chunk_size, "read_chunk_size", self.domain_name())?;
        validate_positive(self.max_frame_size, "max_frame_size", self.domain_name())?;

        if self.eof_backoff.initial_delay.is_zero() {
            return Err(self.validation_error("eof_backoff.initial_delay must be greater than 0"));
        }
        if self.eof_backoff.max_delay < self.eof_backoff.initial_delay {
            return Err(self.validation_error(
                "eof_backoff.max_delay must not be smaller than eof_backoff.initial_delay",
            ));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "transport"
    }
}
