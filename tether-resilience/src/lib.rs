//! Resilience patterns for Tether
//!
//! This crate provides the backoff policies used when the transport hits
//! end-of-stream and when a crashed worker is restarted.

pub mod backoff;

// Re-export commonly used types
pub use backoff::{Backoff, BackoffCalculator, BackoffConfig, BackoffStrategy};
