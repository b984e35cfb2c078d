//! Field descriptors, schemas and lax value coercion

use serde_json::{Map, Number, Value};
use std::collections::HashSet;

use crate::error::SchemaError;
use tether_json::{Segment, DEFAULT_SEPARATOR};

/// Shape of a field's value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
    /// Any JSON value, stored as received
    Any,
    /// A sub-state with its own schema
    Nested(Schema),
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
            FieldKind::Nested(_) => "nested state",
        }
    }

    fn zero_value(&self) -> Value {
        match self {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Integer => Value::from(0),
            FieldKind::Float => Value::from(0.0),
            FieldKind::String => Value::String(String::new()),
            FieldKind::Array => Value::Array(Vec::new()),
            FieldKind::Object | FieldKind::Nested(_) => Value::Object(Map::new()),
            FieldKind::Any => Value::Null,
        }
    }
}

/// How a state treats incoming names its schema does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraFields {
    /// Log and drop unknown names, apply the rest
    #[default]
    Ignore,
    /// Reject the whole update
    Forbid,
}

/// Descriptor of one state field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    default: Option<Value>,
    nullable: bool,
    min: Option<f64>,
    max: Option<f64>,
    bind: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            nullable: false,
            min: None,
            max: None,
            bind: None,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Array)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Any)
    }

    pub fn nested(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldKind::Nested(schema))
    }

    /// Explicit default value, validated when the schema is built
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Accept null in addition to the declared kind
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Inclusive numeric bounds
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// External path template, e.g. `devices.{device}.temperature`
    pub fn bind(mut self, path: impl Into<String>) -> Self {
        self.bind = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn bound_path(&self) -> Option<&str> {
        self.bind.as_deref()
    }

    /// Sub-schema of a nested field
    pub fn nested_schema(&self) -> Option<&Schema> {
        match &self.kind {
            FieldKind::Nested(schema) => Some(schema),
            _ => None,
        }
    }

    /// The value a fresh state starts with
    pub fn initial_value(&self) -> Value {
        match &self.kind {
            FieldKind::Nested(schema) => schema.default_values().into(),
            kind => self.default.clone().unwrap_or_else(|| kind.zero_value()),
        }
    }

    /// Coerce an incoming value to this field's kind.
    ///
    /// Integers accept integral floats and numeric strings, floats accept
    /// integers and numeric strings, bools accept 0/1 and the usual words,
    /// strings accept numbers and bools. Null passes only for nullable fields.
    pub fn coerce(&self, value: &Value) -> Result<Value, SchemaError> {
        if value.is_null() {
            return if self.nullable || self.kind == FieldKind::Any {
                Ok(Value::Null)
            } else {
                Err(self.mismatch(value))
            };
        }

        let coerced = match &self.kind {
            FieldKind::Any => Some(value.clone()),
            FieldKind::Bool => coerce_bool(value).map(Value::Bool),
            FieldKind::Integer => coerce_integer(value),
            FieldKind::Float => coerce_float(value).and_then(Number::from_f64).map(Value::Number),
            FieldKind::String => match value {
                Value::String(s) => Some(Value::String(s.clone())),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            FieldKind::Array => value.is_array().then(|| value.clone()),
            FieldKind::Object | FieldKind::Nested(_) => value.is_object().then(|| value.clone()),
        };

        let coerced = coerced.ok_or_else(|| self.mismatch(value))?;
        self.check_range(&coerced)?;
        Ok(coerced)
    }

    fn check_range(&self, value: &Value) -> Result<(), SchemaError> {
        if self.min.is_none() && self.max.is_none() {
            return Ok(());
        }
        let Some(number) = value.as_f64() else {
            return Ok(());
        };
        let min = self.min.unwrap_or(f64::NEG_INFINITY);
        let max = self.max.unwrap_or(f64::INFINITY);
        if number < min || number > max {
            return Err(SchemaError::OutOfRange {
                field: self.name.clone(),
                value: number,
                min,
                max,
            });
        }
        Ok(())
    }

    fn mismatch(&self, value: &Value) -> SchemaError {
        SchemaError::Coercion {
            field: self.name.clone(),
            expected: self.kind.name(),
            found: value.to_string(),
        }
    }

    /// Check bounds and normalise the explicit default through [`Self::coerce`]
    fn validate(&mut self) -> Result<(), SchemaError> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(SchemaError::InvalidRange {
                    field: self.name.clone(),
                    min,
                    max,
                });
            }
        }

        match (&self.kind, &self.default) {
            (FieldKind::Nested(_), Some(_)) => Err(SchemaError::InvalidDefault {
                field: self.name.clone(),
                reason: "nested states take their defaults from their own schema".to_string(),
            }),
            (_, Some(default)) => {
                let normalised = self.coerce(default).map_err(|e| SchemaError::InvalidDefault {
                    field: self.name.clone(),
                    reason: e.to_string(),
                })?;
                self.default = Some(normalised);
                Ok(())
            }
            (_, None) => Ok(()),
        }
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::Number(n.clone())),
        Value::Number(n) => n.as_f64().and_then(integral).map(Value::from),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .map(Value::from)
        }
        _ => None,
    }
}

fn integral(x: f64) -> Option<i64> {
    (x.is_finite() && x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64)
        .then_some(x as i64)
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}

/// Validated, immutable set of field descriptors
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
    extra: ExtraFields,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            extra: ExtraFields::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn extra_fields(&self) -> ExtraFields {
        self.extra
    }

    /// Every field at its initial value, nested fields as objects
    pub fn default_values(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.initial_value()))
            .collect()
    }
}

/// Builder for [`Schema`]
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    extra: ExtraFields,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn extra_fields(mut self, extra: ExtraFields) -> Self {
        self.extra = extra;
        self
    }

    /// Validate names, ranges and defaults
    pub fn build(mut self) -> Result<Schema, SchemaError> {
        let mut seen = HashSet::new();
        for field in &mut self.fields {
            if field.name.is_empty() {
                return Err(SchemaError::EmptyName {
                    schema: self.name.clone(),
                });
            }
            if field.name.contains(DEFAULT_SEPARATOR) || Segment::parse(&field.name).is_index() {
                return Err(SchemaError::InvalidName {
                    field: field.name.clone(),
                });
            }
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            field.validate()?;
        }

        Ok(Schema {
            name: self.name,
            fields: self.fields,
            extra: self.extra,
        })
    }
}
