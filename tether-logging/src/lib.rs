//! Tracing setup for worker processes
//!
//! Workers speak their protocol on stdout, so every subscriber installed
//! here writes to stderr.

pub mod init;

pub use init::{build_filter, init_simple_tracing, init_worker_tracing};
