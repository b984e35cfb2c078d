//! Serialized framed writer

use bytes::BytesMut;
use std::sync::Arc;
use tether_events::{Signal, SubscriberId};
use tether_json::Document;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

use crate::codec::FrameCodec;
use crate::error::IpcError;

type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

struct WriterInner {
    sink: Mutex<(BoxedWrite, BytesMut)>,
    codec: Box<dyn FrameCodec>,
}

/// Encodes documents onto a byte stream.
///
/// Each message is encoded, written and flushed while holding an async
/// mutex, so concurrent senders never interleave partial frames. Clones
/// share the same stream.
#[derive(Clone)]
pub struct FramedWriter {
    inner: Arc<WriterInner>,
}

impl FramedWriter {
    pub fn new<W>(writer: W, codec: Box<dyn FrameCodec>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(WriterInner {
                sink: Mutex::new((Box::new(writer), BytesMut::new())),
                codec,
            }),
        }
    }

    /// Write one document and flush
    pub async fn send(&self, document: &Document) -> Result<(), IpcError> {
        let mut sink = self.inner.sink.lock().await;
        let (writer, buffer) = &mut *sink;

        buffer.clear();
        self.inner.codec.encode(document, buffer)?;
        writer.write_all(buffer).await?;
        writer.flush().await?;

        trace!(bytes = buffer.len(), "Frame written");
        Ok(())
    }

    /// Register this writer as a subscriber of `signal`
    pub fn subscribe_to(&self, signal: &Signal<Document>, id: impl Into<SubscriberId>) {
        let writer = self.clone();
        signal.connect(id, move |document: Document| {
            let writer = writer.clone();
            async move {
                writer.send(&document).await?;
                Ok::<_, anyhow::Error>(())
            }
        });
    }
}

impl std::fmt::Debug for FramedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LineCodec;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (client, server) = tokio::io::duplex(16);
        let writer = FramedWriter::new(client, Box::new(LineCodec::default()));

        let sends = (0..20).map(|n| {
            let writer = writer.clone();
            tokio::spawn(async move {
                let document = Document::from_value(json!({"n": n, "pad": "x".repeat(40)})).unwrap();
                writer.send(&document).await.unwrap();
            })
        });
        let sends: Vec<_> = sends.collect();

        let mut lines = BufReader::new(server).lines();
        let mut seen = Vec::new();
        for _ in 0..20 {
            let line = lines.next_line().await.unwrap().unwrap();
            let document: Document = line.trim_end().parse().unwrap();
            seen.push(document.get("n").unwrap().as_u64().unwrap());
        }
        for send in sends {
            send.await.unwrap();
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_subscribed_writer_emits_frames() {
        let (client, server) = tokio::io::duplex(256);
        let writer = FramedWriter::new(client, Box::new(LineCodec::default()));
        let outbound: Signal<Document> = Signal::new();
        writer.subscribe_to(&outbound, "stdout");

        outbound
            .emit(Document::from_value(json!({"state": {"ok": true}})).unwrap())
            .await
            .unwrap();

        let mut line = String::new();
        BufReader::new(server).read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"state\":{\"ok\":true}}\r\n");
    }

    #[tokio::test]
    async fn test_closed_stream_reports_error() {
        let (client, server) = tokio::io::duplex(16);
        drop(server);
        let writer = FramedWriter::new(client, Box::new(LineCodec::default()));

        let err = writer
            .send(&Document::from_value(json!({"a": 1})).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
