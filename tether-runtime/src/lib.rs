//! Runtime for Tether workers
//!
//! A [`Worker`] is booted by [`boot`] (or [`boot_with_io`] for arbitrary
//! streams). The [`WorkerProcess`] supervisor restarts it when one of its
//! tasks fails and notifies the bootstrap on terminal shutdown.

pub mod bootstrap;
pub mod error;
pub mod supervisor;
pub mod worker;

pub use bootstrap::{boot, boot_with_io, BootOutcome};
pub use error::{RuntimeError, RuntimeResult};
pub use supervisor::{Lifecycle, ShutdownNotice, TaskId, TaskInfo, WorkerProcess};
pub use worker::Worker;
