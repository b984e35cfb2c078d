//! Backoff strategies for retry loops

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,

    /// Linear increase: delay = initial_delay * attempt
    Linear,

    /// Exponential increase: delay = initial_delay * base^(attempt-1)
    Exponential {
        /// Base for exponential calculation (e.g., 2.0 for doubling)
        base: f64,
    },
}

/// Serializable backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(flatten)]
    pub strategy: BackoffStrategy,

    /// Delay of the first attempt
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Ceiling applied to every computed delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl BackoffConfig {
    /// Linear backoff from `initial_delay` up to `max_delay`
    pub fn linear(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            initial_delay,
            max_delay,
        }
    }

    /// Constant delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            initial_delay: delay,
            max_delay: delay,
        }
    }

    pub fn calculator(&self) -> BackoffCalculator {
        BackoffCalculator::new(self.strategy.clone(), self.initial_delay, self.max_delay)
    }
}

impl Default for BackoffConfig {
    /// One second, growing by a second per attempt, capped at five
    fn default() -> Self {
        Self::linear(Duration::from_secs(1), Duration::from_secs(5))
    }
}

/// Backoff delay calculator
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
}

impl BackoffCalculator {
    /// Create a new backoff calculator
    pub fn new(strategy: BackoffStrategy, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.calculate_base_delay(attempt).min(self.max_delay)
    }

    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,

            BackoffStrategy::Linear => self.initial_delay.saturating_mul(attempt.max(1)),

            BackoffStrategy::Exponential { base } => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                let multiplier = base.powi(attempt as i32 - 1);
                let nanos = self.initial_delay.as_nanos() as f64 * multiplier;
                if nanos.is_finite() && nanos < u64::MAX as f64 {
                    Duration::from_nanos(nanos as u64)
                } else {
                    self.max_delay
                }
            }
        }
    }
}

/// Stateful backoff tracking the current attempt
#[derive(Debug, Clone)]
pub struct Backoff {
    calculator: BackoffCalculator,
    attempt: u32,
}

impl Backoff {
    pub fn new(calculator: BackoffCalculator) -> Self {
        Self {
            calculator,
            attempt: 0,
        }
    }

    /// Delay for the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.calculator.calculate_delay(self.attempt)
    }

    /// Start over from the first attempt
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Backoff::new(config.calculator())
    }
}
