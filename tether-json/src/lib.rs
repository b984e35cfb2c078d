//! Path-addressable JSON documents for Tether
//!
//! This crate provides the document model shared by the transport and the
//! reactive state layer: path keys, path-addressed get/set/delete, flattening
//! and nesting, structural equality and a non-recursive leaf iterator.

pub mod document;
pub mod error;
pub mod iter;
pub mod path;

// Re-export commonly used types
pub use document::Document;
pub use error::DocumentError;
pub use iter::{DocumentIter, Leaf};
pub use path::{ContainerKind, PathKey, Segment, DEFAULT_SEPARATOR};

pub use serde_json::{json, Map, Value};
