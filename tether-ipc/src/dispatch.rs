//! Ordered delivery of inbound documents

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tether_json::Document;
use tracing::{debug, error};

use crate::reader::DocumentReceiver;

/// Receives every inbound document, one at a time
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, document: Document) -> anyhow::Result<()>;
}

#[async_trait]
impl<H> MessageHandler for Arc<H>
where
    H: MessageHandler + ?Sized,
{
    async fn handle(&self, document: Document) -> anyhow::Result<()> {
        (**self).handle(document).await
    }
}

/// Drains the inbound queue in arrival order.
///
/// A document is handed to the handler only after the previous call has
/// returned. Handler errors and panics are logged and do not stop the loop.
pub struct Dispatcher<H> {
    queue: DocumentReceiver,
    handler: H,
}

impl<H: MessageHandler> Dispatcher<H> {
    pub fn new(queue: DocumentReceiver, handler: H) -> Self {
        Self { queue, handler }
    }

    /// Run until every sender of the queue is gone; returns the number of
    /// documents delivered
    pub async fn run(mut self) -> usize {
        let mut delivered = 0;
        while let Some(document) = self.queue.recv().await {
            delivered += 1;
            match AssertUnwindSafe(self.handler.handle(document)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Message handler failed: {:#}", e),
                Err(panic) => error!("Message handler panicked: {}", panic_message(panic.as_ref())),
            }
        }
        debug!(delivered, "Inbound queue drained");
        delivered
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::document_queue;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, document: Document) -> anyhow::Result<()> {
            let n = document.get("n")?.as_i64().unwrap_or_default();
            // earlier messages take longer; order must still hold
            tokio::time::sleep(Duration::from_millis(50 - n as u64 * 10)).await;
            self.seen.lock().push(n);
            anyhow::ensure!(n != 2, "rejected {}", n);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_arrival_order_despite_errors() {
        let (tx, rx) = document_queue();
        let recorder = Arc::new(Recorder::default());
        for n in 0..5 {
            tx.send(Document::from_value(json!({ "n": n })).unwrap()).unwrap();
        }
        drop(tx);

        let delivered = Dispatcher::new(rx, Arc::clone(&recorder)).run().await;

        assert_eq!(delivered, 5);
        assert_eq!(*recorder.seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    struct Fragile {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl MessageHandler for Fragile {
        async fn handle(&self, document: Document) -> anyhow::Result<()> {
            let n = document.get("n")?.as_i64().unwrap_or_default();
            if n == 0 {
                panic!("cannot handle {}", n);
            }
            self.seen.lock().push(n);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_delivery() {
        let (tx, rx) = document_queue();
        let handler = Arc::new(Fragile {
            seen: Mutex::new(Vec::new()),
        });
        for n in 0..3 {
            tx.send(Document::from_value(json!({ "n": n })).unwrap()).unwrap();
        }
        drop(tx);

        let delivered = tokio::spawn(Dispatcher::new(rx, Arc::clone(&handler)).run())
            .await
            .unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(*handler.seen.lock(), vec![1, 2]);
    }
}
