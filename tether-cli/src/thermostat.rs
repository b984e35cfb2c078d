//! Thermostat demo worker
//!
//! Keeps a reactive zone state bound to `zones:<zone>:*`, simulates the room
//! temperature on every tick and reports changes to the parent.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_events::Timer;
use tether_json::Document;
use tether_runtime::{Worker, WorkerProcess};
use tether_state::{Binding, FieldSpec, ReactiveState, Schema};
use tracing::{debug, info};

const HYSTERESIS: f64 = 0.5;
const HEATING_STEP: f64 = 0.5;
const COOLING_STEP: f64 = 0.2;

/// Worker settings, read from `worker.settings`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThermostatSettings {
    /// Substituted for `{zone}` in the external paths
    pub zone: String,

    #[serde(with = "humantime_serde")]
    pub tick: Duration,

    #[serde(with = "humantime_serde")]
    pub heartbeat: Duration,
}

impl Default for ThermostatSettings {
    fn default() -> Self {
        Self {
            zone: "main".to_string(),
            tick: Duration::from_secs(1),
            heartbeat: Duration::from_secs(10),
        }
    }
}

fn zone_schema() -> anyhow::Result<Schema> {
    let sensor = Schema::builder("sensor")
        .field(
            FieldSpec::float("temperature")
                .default_value(18.0)
                .range(-40.0, 60.0)
                .bind("temperature"),
        )
        .build()?;

    let zone = Schema::builder("zone")
        .field(
            FieldSpec::float("setpoint")
                .default_value(21.0)
                .range(5.0, 30.0)
                .bind("zones.{zone}.setpoint"),
        )
        .field(FieldSpec::string("mode").default_value("auto").bind("zones.{zone}.mode"))
        .field(FieldSpec::bool("heating").bind("zones.{zone}.heating"))
        .field(FieldSpec::nested("sensor", sensor).bind("zones.{zone}.sensor"))
        .build()?;
    Ok(zone)
}

pub struct Thermostat {
    settings: ThermostatSettings,
    state: Arc<ReactiveState>,
    heartbeat: Timer,
    beats: Arc<AtomicU64>,
}

impl Thermostat {
    pub fn from_settings(settings: Option<&Value>) -> anyhow::Result<Self> {
        let settings: ThermostatSettings = match settings {
            Some(raw) => serde_json::from_value(raw.clone()).context("Invalid thermostat settings")?,
            None => ThermostatSettings::default(),
        };

        let schema = zone_schema()?;
        let placeholders = HashMap::from([("zone".to_string(), settings.zone.clone())]);
        let binding = Binding::from_schema("thermostat", &schema, &placeholders)?;
        let state = ReactiveState::new(schema).with_binding(binding);

        state.after_update("setpoint", "log-setpoint", |setpoint| async move {
            info!(%setpoint, "Setpoint changed");
            Ok(())
        })?;
        state.after_update("heating", "log-heating", |heating| async move {
            info!(%heating, "Heating switched");
            Ok(())
        })?;

        Ok(Self {
            heartbeat: Timer::new(settings.heartbeat),
            settings,
            state: Arc::new(state),
            beats: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn settings(&self) -> &ThermostatSettings {
        &self.settings
    }
}

#[async_trait]
impl Worker for Thermostat {
    fn on_run(&self, process: &WorkerProcess) -> anyhow::Result<()> {
        self.state.reset();

        let sender = process.clone();
        let beats = Arc::clone(&self.beats);
        self.heartbeat.call_on_timeout("heartbeat", move || {
            let sender = sender.clone();
            let beat = beats.fetch_add(1, Ordering::Relaxed) + 1;
            async move {
                sender.send_value("alive", beat).await?;
                Ok(())
            }
        });
        self.heartbeat.start(Some(self.settings.heartbeat));

        let initial = self.state.send()?;
        let announcer = process.clone();
        process.create_task("announce", async move {
            announcer.send(initial).await?;
            Ok(())
        });
        process.create_task(
            "regulate",
            regulate(Arc::clone(&self.state), process.clone(), self.settings.tick),
        );

        info!(zone = %self.settings.zone, "Thermostat running");
        Ok(())
    }

    async fn on_msg(&self, process: &WorkerProcess, message: Document) -> anyhow::Result<()> {
        if let Ok(command) = message.get("cmd") {
            return match command.as_str() {
                Some("stop") => {
                    process.shutdown("stop requested", false);
                    Ok(())
                }
                Some("dump") => {
                    process.send(self.state.send()?).await?;
                    Ok(())
                }
                Some("reset") => {
                    self.state.reset();
                    process.send(self.state.send()?).await?;
                    Ok(())
                }
                _ => anyhow::bail!("Unknown command {}", command),
            };
        }

        let diff = self.state.receive(&message).await?;
        publish(&self.state, process, diff).await
    }

    fn on_shutdown(&self, _process: &WorkerProcess) -> anyhow::Result<()> {
        self.heartbeat.stop();
        self.heartbeat.clear_callbacks();
        Ok(())
    }
}

/// Send a diff to the parent under its external paths
async fn publish(state: &ReactiveState, process: &WorkerProcess, diff: Document) -> anyhow::Result<()> {
    if diff.is_empty() {
        return Ok(());
    }
    let external = match state.binding() {
        Some(binding) => binding.send(&diff, false)?,
        None => diff,
    };
    process.send(external).await?;
    Ok(())
}

async fn regulate(state: Arc<ReactiveState>, process: WorkerProcess, tick: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(tick);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let setpoint = state.get("setpoint").and_then(|v| v.as_f64()).unwrap_or(21.0);
        let temperature = state
            .get("sensor:temperature")
            .and_then(|v| v.as_f64())
            .unwrap_or(18.0);
        let was_heating = state.get("heating").and_then(|v| v.as_bool()).unwrap_or(false);
        let mode = state.get("mode");

        let heating = match mode.as_ref().and_then(Value::as_str) {
            Some("off") => false,
            Some("boost") => true,
            _ if temperature < setpoint - HYSTERESIS => true,
            _ if temperature > setpoint + HYSTERESIS => false,
            _ => was_heating,
        };
        let step = if heating { HEATING_STEP } else { -COOLING_STEP };
        let next = ((temperature + step) * 10.0).round() / 10.0;

        debug!(temperature = next, heating, "Regulation tick");
        let change = Document::from_value(json!({
            "heating": heating,
            "sensor": {"temperature": next}
        }))?;
        let diff = state.update(&change).await;
        publish(&state, &process, diff).await?;
    }
}
