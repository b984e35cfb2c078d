//! Error types for schemas, bindings and reactive state

use tether_json::{DocumentError, PathKey};
use thiserror::Error;

/// Schema construction and value coercion errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Field name cannot be empty in schema '{schema}'")]
    EmptyName { schema: String },

    #[error("Invalid field name '{field}': names cannot contain ':' or look like an index")]
    InvalidName { field: String },

    #[error("Duplicate field '{field}' in schema '{schema}'")]
    DuplicateField { schema: String, field: String },

    #[error("Invalid default for '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("Invalid range for '{field}': minimum {min} is above maximum {max}")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("Field '{field}' expects {expected}, got {found}")]
    Coercion {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Field '{field}' value {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Binding construction and translation errors
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Empty binding rules for '{binding}'")]
    EmptyRules { binding: String },

    #[error("Binding '{binding}' rules must be a flat JSON object")]
    NotAnObject { binding: String },

    #[error("Binding '{binding}': rule for '{field}' is not a string")]
    NonStringRule { binding: String, field: String },

    #[error("Binding '{binding}': unresolved placeholder '{{{placeholder}}}' in rule '{rule}'")]
    UnresolvedPlaceholder {
        binding: String,
        placeholder: String,
        rule: String,
    },

    #[error("Binding '{binding}': field '{field}' has no bound external path")]
    UnboundField { binding: String, field: String },

    #[error("Binding '{binding}': missing path '{path}'")]
    MissingPath { binding: String, path: PathKey },

    #[error("Invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Reactive state errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Field '{0}' is a nested state, not a value")]
    NotALeaf(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}
