//! Event primitives for Tether workers
//!
//! [`Signal`] fans a value out to every registered async subscriber and waits
//! for all of them. [`Timer`] emits a `Signal<()>` on a fixed interval.

pub mod error;
pub mod signal;
pub mod timer;

pub use error::{SignalError, SignalResult};
pub use signal::{Signal, SubscriberId};
pub use timer::Timer;
