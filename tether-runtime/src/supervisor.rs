//! Task supervision for a single worker
//!
//! [`WorkerProcess`] owns the worker's task registry and lifecycle. A task
//! that fails (error or panic) tears the worker down and boots it again after
//! the restart delay; a terminal [`WorkerProcess::shutdown`] cancels
//! everything and notifies `was_shutdown` subscribers once.

use futures::future::{AbortHandle, Abortable, Aborted};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tether_config::TetherConfig;
use tether_events::{Signal, SignalResult};
use tether_json::Document;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{RuntimeError, RuntimeResult};
use crate::worker::Worker;

/// Identifier of a supervised task, unique per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Running,
    /// Torn down after a task failure, waiting to run again
    Restarting,
    ShuttingDown,
    Terminated,
}

impl Lifecycle {
    fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::ShuttingDown | Lifecycle::Terminated)
    }
}

/// Payload of the `was_shutdown` signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownNotice {
    pub reason: String,
    pub with_error: bool,
}

/// Snapshot of a registered task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
}

struct TaskEntry {
    name: String,
    abort: AbortHandle,
    cancelled: bool,
}

struct Registry {
    lifecycle: Lifecycle,
    tasks: BTreeMap<TaskId, TaskEntry>,
    next_id: u64,
}

struct ProcessInner {
    name: String,
    settings: Option<Value>,
    worker: Arc<dyn Worker>,
    restart_delay: Duration,
    outbound: Signal<Document>,
    was_shutdown: Signal<ShutdownNotice>,
    registry: Mutex<Registry>,
}

type TaskOutcome = Result<Result<anyhow::Result<()>, Box<dyn Any + Send>>, Aborted>;

/// Supervised handle to a running worker. Clones share the same process.
#[derive(Clone)]
pub struct WorkerProcess {
    inner: Arc<ProcessInner>,
}

impl WorkerProcess {
    pub fn new(
        name: impl Into<String>,
        worker: Arc<dyn Worker>,
        settings: Option<Value>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessInner {
                name: name.into(),
                settings,
                worker,
                restart_delay,
                outbound: Signal::new(),
                was_shutdown: Signal::new(),
                registry: Mutex::new(Registry {
                    lifecycle: Lifecycle::Constructed,
                    tasks: BTreeMap::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// Process named and configured from the `worker` and `supervisor` sections
    pub fn from_config(worker: Arc<dyn Worker>, config: &TetherConfig) -> Self {
        Self::new(
            config.worker.name.clone(),
            worker,
            config.worker.settings.clone(),
            config.supervisor.restart_delay,
        )
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Settings passed verbatim from the configuration
    pub fn settings(&self) -> Option<&Value> {
        self.inner.settings.as_ref()
    }

    pub fn worker(&self) -> &Arc<dyn Worker> {
        &self.inner.worker
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.registry.lock().lifecycle
    }

    /// Signal carrying every outbound message
    pub fn outbound(&self) -> &Signal<Document> {
        &self.inner.outbound
    }

    /// Signal emitted once, after a terminal shutdown
    pub fn was_shutdown(&self) -> &Signal<ShutdownNotice> {
        &self.inner.was_shutdown
    }

    /// Invoke the worker's `on_run` hook
    pub fn run(&self) -> RuntimeResult<()> {
        {
            let mut registry = self.inner.registry.lock();
            if registry.lifecycle.is_terminal() {
                return Err(RuntimeError::Terminated(self.inner.name.clone()));
            }
            registry.lifecycle = Lifecycle::Running;
        }

        info!("Running worker");
        self.inner
            .worker
            .on_run(self)
            .map_err(|source| RuntimeError::boot(self.inner.name.clone(), source))
    }

    /// Spawn a supervised task.
    ///
    /// The task is registered before it is spawned, so it is visible to
    /// [`tasks`](Self::tasks) and cancellation immediately.
    pub fn create_task<F>(&self, name: impl Into<String>, future: F) -> TaskId
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let (abort, registration) = AbortHandle::new_pair();

        let id = {
            let mut registry = self.inner.registry.lock();
            let id = TaskId(registry.next_id);
            registry.next_id += 1;
            registry.tasks.insert(
                id,
                TaskEntry {
                    name: name.clone(),
                    abort,
                    cancelled: false,
                },
            );
            id
        };
        info!(task = %name, id = %id, "Created task");

        let process = self.clone();
        let supervised = Abortable::new(AssertUnwindSafe(future).catch_unwind(), registration);
        tokio::spawn(
            async move {
                let outcome = supervised.await;
                process.on_task_done(id, &name, outcome);
            }
            .in_current_span(),
        );

        id
    }

    /// Cancel one task; returns whether it was registered
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let mut registry = self.inner.registry.lock();
        let Some(entry) = registry.tasks.get_mut(&id) else {
            return false;
        };
        if !entry.cancelled {
            info!(task = %entry.name, id = %id, "Cancelling task");
            entry.cancelled = true;
            entry.abort.abort();
        }
        true
    }

    /// Cancel every task registered at the time of the call
    pub fn cancel_all_tasks(&self) {
        let handles: Vec<AbortHandle> = {
            let mut registry = self.inner.registry.lock();
            registry
                .tasks
                .values_mut()
                .filter(|entry| !entry.cancelled)
                .map(|entry| {
                    entry.cancelled = true;
                    entry.abort.clone()
                })
                .collect()
        };
        if !handles.is_empty() {
            warn!(count = handles.len(), "Cancelling all tasks");
        }
        for handle in handles {
            handle.abort();
        }
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.inner
            .registry
            .lock()
            .tasks
            .iter()
            .map(|(id, entry)| TaskInfo {
                id: *id,
                name: entry.name.clone(),
            })
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.inner.registry.lock().tasks.len()
    }

    /// Whether any task is still registered
    pub fn is_busy(&self) -> bool {
        self.task_count() > 0
    }

    /// Emit a message on the outbound signal
    pub async fn send(&self, message: Document) -> SignalResult {
        self.inner.outbound.emit(message).await
    }

    /// Send `value` wrapped under the top-level key `prefix`
    pub async fn send_value(&self, prefix: impl Into<String>, value: impl Into<Value>) -> SignalResult {
        let mut root = Map::new();
        root.insert(prefix.into(), value.into());
        self.send(Document::from(root)).await
    }

    /// Terminal shutdown.
    ///
    /// Runs the shutdown hook, cancels every task and notifies
    /// `was_shutdown` subscribers. Calls after the first are ignored.
    pub fn shutdown(&self, reason: &str, with_error: bool) {
        {
            let mut registry = self.inner.registry.lock();
            if registry.lifecycle.is_terminal() {
                debug!(reason, "Shutdown already in progress");
                return;
            }
            registry.lifecycle = Lifecycle::ShuttingDown;
        }
        warn!(with_error, "Shutting down, reason: {}", reason);

        self.teardown();

        let process = self.clone();
        let notice = ShutdownNotice {
            reason: reason.to_string(),
            with_error,
        };
        tokio::spawn(
            async move {
                if let Err(e) = process.inner.was_shutdown.emit(notice).await {
                    error!("Shutdown subscriber failed: {:#}", e);
                }
                process.inner.registry.lock().lifecycle = Lifecycle::Terminated;
            }
            .in_current_span(),
        );
    }

    /// Shutdown hook followed by cancellation of every task
    fn teardown(&self) {
        let created_before = self.inner.registry.lock().next_id;
        if let Err(e) = self.inner.worker.on_shutdown(self) {
            error!("Shutdown hook failed: {:#}", e);
        }
        if self.inner.registry.lock().next_id != created_before {
            warn!("Tasks were created inside the shutdown hook; they will be cancelled");
        }
        self.cancel_all_tasks();
    }

    fn on_task_done(&self, id: TaskId, name: &str, outcome: TaskOutcome) {
        self.inner.registry.lock().tasks.remove(&id);

        match outcome {
            Err(Aborted) => warn!(task = %name, id = %id, "Task cancelled"),
            Ok(Ok(Ok(()))) => info!(task = %name, id = %id, "Task done"),
            Ok(Ok(Err(e))) => {
                error!(task = %name, id = %id, "Task failed: {:#}", e);
                self.restart(&format!("task '{}' failed", name));
            }
            Ok(Err(panic)) => {
                error!(task = %name, id = %id, "Task panicked: {}", panic_message(panic.as_ref()));
                self.restart(&format!("task '{}' panicked", name));
            }
        }
    }

    /// Tear down and schedule `run()` after the restart delay
    fn restart(&self, reason: &str) {
        {
            let mut registry = self.inner.registry.lock();
            match registry.lifecycle {
                lifecycle if lifecycle.is_terminal() => {
                    debug!(reason, "Shutdown in progress, not restarting");
                    return;
                }
                Lifecycle::Restarting => {
                    debug!(reason, "Restart already scheduled");
                    return;
                }
                _ => registry.lifecycle = Lifecycle::Restarting,
            }
        }
        warn!("Restarting worker, reason: {}", reason);

        self.teardown();

        let process = self.clone();
        let delay = self.inner.restart_delay;
        tokio::spawn(
            async move {
                warn!("Waiting {:?} before restart", delay);
                tokio::time::sleep(delay).await;

                if process.lifecycle() != Lifecycle::Restarting {
                    debug!("Restart abandoned");
                    return;
                }
                match process.run() {
                    Ok(()) => info!("Worker restarted"),
                    Err(RuntimeError::Terminated(_)) => debug!("Restart abandoned"),
                    Err(e) => {
                        error!("{}", e);
                        process.shutdown("boot failure during restart", true);
                    }
                }
            }
            .in_current_span(),
        );
    }
}

impl fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("name", &self.inner.name)
            .field("lifecycle", &self.lifecycle())
            .field("tasks", &self.task_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
