//! IPC error types

use tether_json::DocumentError;
use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Inbound frame grew past the configured limit and was dropped
    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },
}

impl IpcError {
    /// Check if the stream may recover, as with a closed pipe that gets reopened
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpcError::ConnectionClosed)
    }

    /// Check if this error only affects the current frame
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            IpcError::DeserializationError(_) | IpcError::InvalidMessage(_) | IpcError::FrameTooLarge { .. }
        )
    }

    /// Check if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, IpcError::SerializationError(_) | IpcError::IoError(_))
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => IpcError::ConnectionClosed,
            _ => IpcError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::IoError(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::DeserializationError(err.to_string())
        } else {
            IpcError::SerializationError(err.to_string())
        }
    }
}

impl From<DocumentError> for IpcError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Json(e) => e.into(),
            other => IpcError::InvalidMessage(other.to_string()),
        }
    }
}
