//! Async multi-subscriber signal

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{SignalError, SignalResult};

/// Key under which a subscriber is registered
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Process-unique id starting with `prefix`
    pub fn unique(prefix: &str) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(format!("{}#{}", prefix, NEXT.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

type Callback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ArglessCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

enum Slot<T> {
    Callback(Callback<T>),
    Argless(ArglessCallback),
    /// Already built future, consumed by the next emit
    Deferred(BoxFuture<'static, anyhow::Result<()>>),
}

/// Invocation captured under the lock and started after it is released
enum Pending<T> {
    Callback(Callback<T>),
    Argless(ArglessCallback),
    Ready(BoxFuture<'static, anyhow::Result<()>>),
}

/// Fan-out of a value to every registered async subscriber.
///
/// Subscribers are kept in registration order; registering an id that is
/// already present replaces its callback in place. Clones share the same
/// subscriber list.
pub struct Signal<T> {
    subscribers: Arc<Mutex<Vec<(SubscriberId, Slot<T>)>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscribers())
            .finish()
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback that receives every emitted value
    pub fn connect<F, Fut>(&self, id: impl Into<SubscriberId>, callback: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: Callback<T> = Arc::new(move |args| callback(args).boxed());
        self.insert(id.into(), Slot::Callback(callback));
    }

    /// Register a callback that is invoked on every emit without the value
    pub fn connect_argless<F, Fut>(&self, id: impl Into<SubscriberId>, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: ArglessCallback = Arc::new(move || callback().boxed());
        self.insert(id.into(), Slot::Argless(callback));
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| existing != id);
        subscribers.len() != before
    }

    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|(existing, _)| existing == id)
    }

    /// Dispatch `args` to every subscriber concurrently and wait for all.
    ///
    /// Every invocation is started before any is awaited to completion. When
    /// subscribers fail, the first failure in registration order is returned
    /// once all of them have finished.
    pub async fn emit(&self, args: T) -> SignalResult {
        let pending = self.snapshot();
        if pending.is_empty() {
            return Ok(());
        }
        trace!(subscribers = pending.len(), "Emitting signal");

        let invocations = pending.into_iter().map(|(id, pending)| {
            let future = match pending {
                Pending::Callback(callback) => callback(args.clone()),
                Pending::Argless(callback) => callback(),
                Pending::Ready(future) => future,
            };
            async move { future.await.map_err(|source| SignalError::Subscriber { id, source }) }
        });

        join_all(invocations)
            .await
            .into_iter()
            .find_map(Result::err)
            .map_or(Ok(()), Err)
    }
}

impl<T> Signal<T> {
    /// Ids of the registered subscribers in registration order
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        self.subscribers.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    fn insert(&self, id: SubscriberId, slot: Slot<T>) {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, existing)) => *existing = slot,
            None => subscribers.push((id, slot)),
        }
    }

    /// Clone the callbacks and take the deferred futures out of the list
    fn snapshot(&self) -> Vec<(SubscriberId, Pending<T>)> {
        let mut subscribers = self.subscribers.lock();
        let mut pending = Vec::with_capacity(subscribers.len());
        let mut kept = Vec::with_capacity(subscribers.len());

        for (id, slot) in subscribers.drain(..) {
            match slot {
                Slot::Callback(callback) => {
                    pending.push((id.clone(), Pending::Callback(Arc::clone(&callback))));
                    kept.push((id, Slot::Callback(callback)));
                }
                Slot::Argless(callback) => {
                    pending.push((id.clone(), Pending::Argless(Arc::clone(&callback))));
                    kept.push((id, Slot::Argless(callback)));
                }
                Slot::Deferred(future) => pending.push((id, Pending::Ready(future))),
            }
        }

        *subscribers = kept;
        pending
    }
}

impl Signal<()> {
    /// Register an already built future that runs once, on the next emit
    pub fn connect_deferred<Fut>(&self, id: impl Into<SubscriberId>, future: Fut)
    where
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.insert(id.into(), Slot::Deferred(future.boxed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[test]
    fn test_emit_without_subscribers_resolves_immediately() {
        let signal: Signal<u32> = Signal::new();
        assert!(matches!(signal.emit(7).now_or_never(), Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_value() {
        let signal = Signal::new();
        let total = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b", "c"] {
            let total = Arc::clone(&total);
            signal.connect(name, move |value: usize| {
                let total = Arc::clone(&total);
                async move {
                    total.fetch_add(value, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        signal.emit(5).await.unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn test_argless_subscriber_is_called() {
        let signal: Signal<String> = Signal::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        signal.connect_argless("tick", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        signal.emit("ignored".to_string()).await.unwrap();
        signal.emit("ignored".to_string()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_same_id_replaces_subscriber() {
        let signal = Signal::new();
        let seen = Arc::new(AtomicUsize::new(0));

        signal.connect("only", |_: usize| async { anyhow::bail!("replaced callback ran") });
        let counter = Arc::clone(&seen);
        signal.connect("only", move |value: usize| {
            let counter = Arc::clone(&counter);
            async move {
                counter.store(value, Ordering::SeqCst);
                Ok(())
            }
        });

        assert_eq!(signal.len(), 1);
        signal.emit(9).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_deferred_runs_once_and_is_removed() {
        let signal: Signal<()> = Signal::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        signal.connect_deferred("once", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(signal.len(), 1);
        signal.emit(()).await.unwrap();
        assert!(signal.is_empty());
        signal.emit(()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribers_run_concurrently() {
        let signal: Signal<()> = Signal::new();
        let barrier = Arc::new(Barrier::new(2));

        for name in ["left", "right"] {
            let barrier = Arc::clone(&barrier);
            signal.connect_argless(name, move || {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            });
        }

        tokio::time::timeout(Duration::from_secs(5), signal.emit(()))
            .await
            .expect("subscribers should not run one after another")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_returned_after_siblings_finish() {
        let signal: Signal<()> = Signal::new();
        let finished = Arc::new(AtomicUsize::new(0));

        signal.connect_argless("fails", || async { anyhow::bail!("boom") });
        let counter = Arc::clone(&finished);
        signal.connect_argless("slow", move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        signal.connect_argless("also-fails", || async { anyhow::bail!("second") });

        let err = signal.emit(()).await.unwrap_err();
        assert_eq!(err.subscriber().as_str(), "fails");
        assert!(err.to_string().contains("boom"));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let signal: Signal<u8> = Signal::new();
        signal.connect("a", |_| async { Ok(()) });
        signal.connect("b", |_| async { Ok(()) });

        assert!(signal.remove(&SubscriberId::from("a")));
        assert!(!signal.remove(&SubscriberId::from("a")));
        assert_eq!(signal.subscribers(), vec![SubscriberId::from("b")]);

        let shared = signal.clone();
        shared.clear();
        assert!(signal.is_empty());
    }

    #[test]
    fn test_unique_ids_differ() {
        assert_ne!(SubscriberId::unique("bind"), SubscriberId::unique("bind"));
    }
}
