//! Booting a worker over an in-memory stream

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tether_config::TetherConfig;
use tether_json::Document;
use tether_runtime::{boot_with_io, BootOutcome, Worker, WorkerProcess};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

/// Echoes messages under `echo`; `{"cmd": ...}` drives shutdown
struct Echo;

#[async_trait]
impl Worker for Echo {
    fn on_run(&self, process: &WorkerProcess) -> anyhow::Result<()> {
        let refuse = process
            .settings()
            .and_then(|settings| settings.get("refuse_boot"))
            .and_then(|refuse| refuse.as_bool())
            .unwrap_or(false);
        anyhow::ensure!(!refuse, "boot refused by settings");
        Ok(())
    }

    async fn on_msg(&self, process: &WorkerProcess, message: Document) -> anyhow::Result<()> {
        match message.get("cmd").ok().and_then(|cmd| cmd.as_str()) {
            Some("stop") => process.shutdown("requested", false),
            Some("abort") => process.shutdown("aborted", true),
            Some(other) => anyhow::bail!("unknown command {}", other),
            None => process.send_value("echo", message.into_value()).await?,
        }
        Ok(())
    }
}

fn config() -> TetherConfig {
    let mut config = TetherConfig::default();
    config.worker.name = "echo".to_string();
    config.worker.source = "builtin:echo".to_string();
    config
}

struct Parent {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    input: WriteHalf<DuplexStream>,
    boot: JoinHandle<BootOutcome>,
}

impl Parent {
    fn spawn(config: TetherConfig) -> Self {
        let (parent, child) = tokio::io::duplex(4096);
        let (child_in, child_out) = tokio::io::split(child);
        let boot = tokio::spawn(boot_with_io(Arc::new(Echo), config, child_in, child_out));
        let (parent_out, input) = tokio::io::split(parent);
        Self {
            lines: BufReader::new(parent_out).lines(),
            input,
            boot,
        }
    }

    async fn send(&mut self, raw: &str) {
        self.input.write_all(raw.as_bytes()).await.unwrap();
    }

    async fn next(&mut self) -> serde_json::Value {
        let line = self.lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_messages_are_echoed_in_order_until_stop() {
    let mut parent = Parent::spawn(config());

    parent.send("{\"n\":1}\r\nnot json\r\n{\"cmd\":\"dance\"}\r\n{\"n\":2}\r\n").await;
    assert_eq!(parent.next().await, json!({"echo": {"n": 1}}));
    assert_eq!(parent.next().await, json!({"echo": {"n": 2}}));

    parent.send("{\"cmd\":\"stop\"}\r\n").await;
    let started = tokio::time::Instant::now();
    assert_eq!(parent.boot.await.unwrap(), BootOutcome::Clean);
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_flat_keys_arrive_nested() {
    let mut parent = Parent::spawn(config());

    parent.send("{\"zones:kitchen:setpoint\":25,\"zones:kitchen:mode\":\"eco\"}\r\n").await;
    assert_eq!(
        parent.next().await,
        json!({"echo": {"zones": {"kitchen": {"setpoint": 25, "mode": "eco"}}}})
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_transport_config_fails_the_boot() {
    let mut config = config();
    config.transport.max_frame_size = 0;
    let parent = Parent::spawn(config);

    assert_eq!(parent.boot.await.unwrap(), BootOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_error_shutdown_fails_the_boot() {
    let mut parent = Parent::spawn(config());
    parent.send("{\"cmd\":\"abort\"}\r\n").await;
    assert_eq!(parent.boot.await.unwrap(), BootOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_test_data_is_injected_after_delay() {
    let mut config = config();
    config.worker.test_data = Some(json!({"sample:values": [1, 2]}));
    let mut parent = Parent::spawn(config);

    let started = tokio::time::Instant::now();
    assert_eq!(parent.next().await, json!({"echo": {"sample": {"values": [1, 2]}}}));
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_boot_failure_is_reported_immediately() {
    let mut config = config();
    config.worker.settings = Some(json!({"refuse_boot": true}));
    let parent = Parent::spawn(config);

    assert_eq!(parent.boot.await.unwrap(), BootOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_missing_name_is_a_boot_failure() {
    let mut config = config();
    config.worker.name.clear();
    let parent = Parent::spawn(config);

    assert_eq!(parent.boot.await.unwrap(), BootOutcome::Failed);
}
