//! Worker bootstrap: wires the transport, supervisor and signal handlers

use async_trait::async_trait;
use std::process::ExitCode;
use std::sync::Arc;
use tether_config::TetherConfig;
use tether_ipc::{document_queue, framed_pair, Dispatcher, MessageHandler};
use tether_json::{Document, DEFAULT_SEPARATOR};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{RuntimeError, RuntimeResult};
use crate::supervisor::{ShutdownNotice, WorkerProcess};
use crate::worker::Worker;

/// How a booted worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Shut down without error
    Clean,
    /// Boot failure or an error flagged shutdown
    Failed,
}

impl BootOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            BootOutcome::Clean => 0,
            BootOutcome::Failed => 1,
        }
    }
}

impl From<BootOutcome> for ExitCode {
    fn from(outcome: BootOutcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}

/// Boot `worker` on stdin/stdout
pub async fn boot(worker: Arc<dyn Worker>, config: TetherConfig) -> BootOutcome {
    boot_with_io(worker, config, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Boot `worker` on arbitrary streams and wait for its terminal shutdown.
///
/// Returns once a shutdown was notified and the configured grace period has
/// passed, or immediately on a boot failure.
pub async fn boot_with_io<R, W>(worker: Arc<dyn Worker>, config: TetherConfig, input: R, output: W) -> BootOutcome
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let span = info_span!("worker", name = %config.worker.name);
    async move {
        info!("Starting boot sequence");
        match serve(worker, &config, input, output).await {
            Ok(notice) if notice.with_error => BootOutcome::Failed,
            Ok(_) => BootOutcome::Clean,
            Err(e) => {
                error!("Critical error on boot: {}", e);
                BootOutcome::Failed
            }
        }
    }
    .instrument(span)
    .await
}

async fn serve<R, W>(
    worker: Arc<dyn Worker>,
    config: &TetherConfig,
    input: R,
    output: W,
) -> RuntimeResult<ShutdownNotice>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    config.validate_all()?;

    let process = WorkerProcess::from_config(Arc::clone(&worker), config);

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    process.was_shutdown().connect("bootstrap", move |notice: ShutdownNotice| {
        let _ = notice_tx.send(notice);
        async { Ok(()) }
    });

    let (reader, writer) = framed_pair(input, output, &config.transport);
    writer.subscribe_to(process.outbound(), "transport");
    let (queue_tx, queue_rx) = document_queue();

    let signals = watch_signals(&process)?;
    if let Err(e) = process.run() {
        signals.abort();
        process.cancel_all_tasks();
        return Err(e);
    }
    let mut background: Vec<JoinHandle<()>> = vec![signals];

    let reader_process = process.clone();
    background.push(tokio::spawn(
        async move {
            if let Err(e) = reader.run(queue_tx).await {
                error!("Transport failed: {}", e);
                reader_process.shutdown("input stream failed", true);
            }
        }
        .in_current_span(),
    ));
    let handler = WorkerHandler {
        process: process.clone(),
    };
    background.push(tokio::spawn(
        async move {
            Dispatcher::new(queue_rx, handler).run().await;
        }
        .in_current_span(),
    ));
    info!(framing = %config.transport.framing, "Connected transport to worker");

    if let Some(test_data) = config.worker.test_data.clone() {
        let delay = config.worker.test_delay;
        let process = process.clone();
        background.push(tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                let handler = WorkerHandler { process };
                let message = Document::from_value(test_data).and_then(|mut message| {
                    message.nest(DEFAULT_SEPARATOR)?;
                    Ok(message)
                });
                match message {
                    Ok(message) => {
                        info!("Injecting test data");
                        if let Err(e) = handler.handle(message).await {
                            error!("Test data handling failed: {:#}", e);
                        }
                    }
                    Err(e) => error!("Test data is not a document: {}", e),
                }
            }
            .in_current_span(),
        ));
    }

    let notice = notice_rx.recv().await.unwrap_or_else(|| ShutdownNotice {
        reason: "shutdown channel closed".to_string(),
        with_error: true,
    });
    warn!(
        "Worker is shutting down, waiting {:?} before quitting",
        config.supervisor.shutdown_grace
    );
    tokio::time::sleep(config.supervisor.shutdown_grace).await;

    for task in background {
        task.abort();
    }
    info!(reason = %notice.reason, with_error = notice.with_error, "Worker stopped");
    Ok(notice)
}

/// Delivers queued messages to the worker
struct WorkerHandler {
    process: WorkerProcess,
}

#[async_trait]
impl MessageHandler for WorkerHandler {
    async fn handle(&self, document: Document) -> anyhow::Result<()> {
        self.process.worker().on_msg(&self.process, document).await
    }
}

#[cfg(unix)]
fn watch_signals(process: &WorkerProcess) -> RuntimeResult<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let name = process.name().to_string();
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| RuntimeError::boot(name.clone(), e))?;
    let mut quit = signal(SignalKind::quit()).map_err(|e| RuntimeError::boot(name, e))?;

    let process = process.clone();
    Ok(tokio::spawn(
        async move {
            loop {
                let received = tokio::select! {
                    _ = terminate.recv() => "SIGTERM",
                    _ = quit.recv() => "SIGQUIT",
                };
                warn!("Received {}", received);
                process.shutdown(&format!("signal {}", received), false);
            }
        }
        .in_current_span(),
    ))
}

#[cfg(not(unix))]
fn watch_signals(_process: &WorkerProcess) -> RuntimeResult<JoinHandle<()>> {
    Ok(tokio::spawn(async {}))
}
