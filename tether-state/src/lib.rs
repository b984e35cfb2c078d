//! Reactive, schema-validated state for Tether workers
//!
//! A [`Schema`] declares a fixed set of typed fields. A [`ReactiveState`]
//! holds their current values, applies lax-coerced partial updates, reports
//! what changed and notifies per-field subscribers. A [`Binding`] maps field
//! names onto the external paths used on the wire.

pub mod binding;
pub mod error;
pub mod schema;
pub mod state;

pub use binding::{Binding, IGNORE_RULE};
pub use error::{BindingError, SchemaError, StateError};
pub use schema::{ExtraFields, FieldKind, FieldSpec, Schema, SchemaBuilder};
pub use state::ReactiveState;
