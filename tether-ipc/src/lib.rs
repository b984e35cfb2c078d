//! Transport for Tether workers
//!
//! JSON documents travel over a byte stream (stdin/stdout for a spawned
//! worker) in one of two framings. A [`FramedReader`] decodes inbound frames
//! onto an ordered queue that a [`Dispatcher`] drains into a
//! [`MessageHandler`]; a [`FramedWriter`] serializes outbound documents.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{codec_for, BraceCodec, FrameCodec, LineCodec, DEFAULT_MAX_FRAME_SIZE, LINE_TERMINATOR};
pub use dispatch::{Dispatcher, MessageHandler};
pub use error::IpcError;
pub use reader::{document_queue, DocumentReceiver, DocumentSender, FramedReader};
pub use writer::FramedWriter;

use tether_config::TransportConfig;
use tokio::io::{AsyncRead, AsyncWrite};

/// Reader and writer for the same transport configuration
pub fn framed_pair<R, W>(reader: R, writer: W, config: &TransportConfig) -> (FramedReader<R>, FramedWriter)
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Send + Unpin + 'static,
{
    (
        FramedReader::from_config(reader, config),
        FramedWriter::new(writer, codec_for(config.framing, config.max_frame_size)),
    )
}
