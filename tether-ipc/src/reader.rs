//! Framed reader feeding the inbound document queue

use bytes::BytesMut;
use tether_config::TransportConfig;
use tether_json::Document;
use tether_resilience::{Backoff, BackoffConfig};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::codec::{codec_for, FrameCodec};
use crate::error::IpcError;

/// Sending half of the inbound queue
pub type DocumentSender = mpsc::UnboundedSender<Document>;
/// Receiving half of the inbound queue
pub type DocumentReceiver = mpsc::UnboundedReceiver<Document>;

/// Unbounded, ordered queue between the reader and the dispatcher
pub fn document_queue() -> (DocumentSender, DocumentReceiver) {
    mpsc::unbounded_channel()
}

/// Reads chunks from a byte stream, decodes frames and queues documents.
///
/// Malformed frames are logged and dropped. End-of-stream is not terminal:
/// the reader backs off and polls the stream again, as it does for a closed
/// pipe. Any other read failure ends the reader with an error.
pub struct FramedReader<R> {
    reader: R,
    codec: Box<dyn FrameCodec>,
    chunk_size: usize,
    eof_backoff: BackoffConfig,
}

impl<R> FramedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, codec: Box<dyn FrameCodec>) -> Self {
        let defaults = TransportConfig::default();
        Self {
            reader,
            codec,
            chunk_size: defaults.read_chunk_size,
            eof_backoff: defaults.eof_backoff,
        }
    }

    /// Reader using the framing, chunk size and backoff from `config`
    pub fn from_config(reader: R, config: &TransportConfig) -> Self {
        Self {
            reader,
            codec: codec_for(config.framing, config.max_frame_size),
            chunk_size: config.read_chunk_size.max(1),
            eof_backoff: config.eof_backoff.clone(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_eof_backoff(mut self, eof_backoff: BackoffConfig) -> Self {
        self.eof_backoff = eof_backoff;
        self
    }

    /// Read until the queue is closed or the stream fails.
    ///
    /// Returns `Ok(())` once the receiving side of `queue` has been dropped.
    pub async fn run(mut self, queue: DocumentSender) -> Result<(), IpcError> {
        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        let mut chunk = vec![0u8; self.chunk_size];
        let mut backoff = Backoff::from(&self.eof_backoff);

        loop {
            let count = match self.reader.read(&mut chunk).await.map_err(IpcError::from) {
                Ok(count) => count,
                Err(e) if e.is_retryable() => 0,
                Err(e) => {
                    error!("Input stream failed: {}", e);
                    return Err(e);
                }
            };

            if count == 0 {
                if queue.is_closed() {
                    return Ok(());
                }
                let delay = backoff.next_delay();
                error!(attempt = backoff.attempt(), "Input stream EOF, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                continue;
            }

            backoff.reset();
            buffer.extend_from_slice(&chunk[..count]);

            loop {
                match self.codec.decode(&mut buffer) {
                    Ok(Some(document)) => {
                        if queue.send(document).is_err() {
                            debug!("Inbound queue closed, stopping reader");
                            return Ok(());
                        }
                    }
                    Ok(None) => break,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("Discarding malformed frame: {}", e),
                }
            }
        }
    }
}
