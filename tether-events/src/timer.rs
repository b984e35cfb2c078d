//! Interval timer emitting a `Signal<()>`

use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::signal::{Signal, SubscriberId};

struct TimerState {
    interval: Duration,
    single_shot: bool,
    active: bool,
    started_at: Instant,
    /// Bumped on every start/stop so a stale tick task cannot touch the state
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct TimerInner {
    timeout: Signal<()>,
    state: Mutex<TimerState>,
}

impl Drop for TimerInner {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.abort();
        }
    }
}

/// Emits [`Timer::timeout`] every `interval`, or once when single-shot.
///
/// Must be started from within a tokio runtime. Dropping the last handle
/// stops the tick task.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                timeout: Signal::new(),
                state: Mutex::new(TimerState {
                    interval,
                    single_shot: false,
                    active: false,
                    started_at: Instant::now(),
                    generation: 0,
                    task: None,
                }),
            }),
        }
    }

    /// Timer that fires once after `interval`
    pub fn single_shot(interval: Duration) -> Self {
        let timer = Self::new(interval);
        timer.set_single_shot(true);
        timer
    }

    /// Signal emitted on every tick
    pub fn timeout(&self) -> &Signal<()> {
        &self.inner.timeout
    }

    /// Register an argument-less tick callback
    pub fn call_on_timeout<F, Fut>(&self, id: impl Into<SubscriberId>, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.timeout.connect_argless(id, callback);
    }

    pub fn clear_callbacks(&self) {
        self.inner.timeout.clear();
    }

    pub fn interval(&self) -> Duration {
        self.inner.state.lock().interval
    }

    /// Takes effect on the next start
    pub fn set_interval(&self, interval: Duration) {
        self.inner.state.lock().interval = interval;
    }

    pub fn set_single_shot(&self, single_shot: bool) {
        self.inner.state.lock().single_shot = single_shot;
    }

    pub fn is_single_shot(&self) -> bool {
        self.inner.state.lock().single_shot
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Time until the next tick, `None` while the timer is inactive
    pub fn remaining_time(&self) -> Option<Duration> {
        let state = self.inner.state.lock();
        state
            .active
            .then(|| state.interval.saturating_sub(state.started_at.elapsed()))
    }

    /// (Re)start the timer, optionally replacing the interval
    pub fn start(&self, interval: Option<Duration>) {
        let mut state = self.inner.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(interval) = interval {
            state.interval = interval;
        }

        state.generation += 1;
        state.active = true;
        state.started_at = Instant::now();

        let weak = Arc::downgrade(&self.inner);
        state.task = Some(tokio::spawn(tick(weak, state.generation)));
    }

    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.generation += 1;
        state.active = false;
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Timer")
            .field("interval", &state.interval)
            .field("single_shot", &state.single_shot)
            .field("active", &state.active)
            .finish()
    }
}

async fn tick(timer: Weak<TimerInner>, generation: u64) {
    loop {
        let interval = match timer.upgrade() {
            Some(inner) => inner.state.lock().interval,
            None => return,
        };
        tokio::time::sleep(interval).await;

        let Some(inner) = timer.upgrade() else {
            return;
        };
        if let Err(e) = inner.timeout.emit(()).await {
            warn!("Timer subscriber failed: {}", e);
        }

        let mut state = inner.state.lock();
        if state.generation != generation {
            return;
        }
        if state.single_shot {
            state.active = false;
            state.task = None;
            return;
        }
        state.started_at = Instant::now();
    }
}
