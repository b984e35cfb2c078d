//! Document error types

use thiserror::Error;

/// Errors raised while addressing or converting documents
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Path with no segments
    #[error("Empty document path")]
    EmptyPath,

    /// A segment of the path does not exist
    #[error("Missing key '{segment}' in path '{path}'")]
    MissingKey { path: String, segment: String },

    /// A name segment was applied to a sequence, or an index to a mapping
    #[error("Kind mismatch at '{segment}' in path '{path}': expected {expected}, found {found}")]
    KindMismatch {
        path: String,
        segment: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Documents are rooted at a JSON object
    #[error("Document root must be an object, got {0}")]
    NotAnObject(&'static str),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DocumentError {
    /// Whether the error means the path simply does not resolve
    pub fn is_missing(&self) -> bool {
        matches!(self, DocumentError::MissingKey { .. })
    }
}
