//! Worker definition hooks

use async_trait::async_trait;
use tether_json::Document;

use crate::supervisor::WorkerProcess;

/// A worker driven by the supervisor.
///
/// `on_run` is called at boot and again after every crash-restart; it
/// typically spawns the worker's long running tasks through
/// [`WorkerProcess::create_task`]. `on_shutdown` runs before the tasks are
/// cancelled, both on terminal shutdown and on the teardown preceding a
/// restart.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn on_run(&self, process: &WorkerProcess) -> anyhow::Result<()>;

    /// Handle one inbound message. Messages are delivered one at a time, in
    /// arrival order.
    async fn on_msg(&self, process: &WorkerProcess, message: Document) -> anyhow::Result<()>;

    fn on_shutdown(&self, _process: &WorkerProcess) -> anyhow::Result<()> {
        Ok(())
    }
}
