//! Translation between internal field names and external wire paths

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::BindingError;
use crate::schema::Schema;
use tether_json::{Document, PathKey, Segment, DEFAULT_SEPARATOR};

/// Rule value marking a field as deliberately unbound
pub const IGNORE_RULE: &str = "<ignore>";

const PLACEHOLDER: &str = r"\{(\w*)\}";

#[derive(Debug, Clone, PartialEq)]
struct Mapping {
    internal: PathKey,
    external: PathKey,
}

/// Maps internal field paths to external document paths.
///
/// Rules are written as a flat object of `field: "external.path"` templates.
/// Both `.` and `:` separate segments, and `{name}` placeholders are replaced
/// from the table given at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    name: String,
    mappings: Vec<Mapping>,
    ignored: Vec<String>,
}

impl Binding {
    /// Build a binding from a flat rule object
    pub fn new(
        name: impl Into<String>,
        rules: &Value,
        placeholders: &HashMap<String, String>,
    ) -> Result<Self, BindingError> {
        let name = name.into();
        let Value::Object(rules) = rules else {
            return Err(BindingError::NotAnObject { binding: name });
        };
        if rules.is_empty() {
            return Err(BindingError::EmptyRules { binding: name });
        }

        let matcher = Regex::new(PLACEHOLDER)?;
        let mut binding = Binding {
            name,
            mappings: Vec::with_capacity(rules.len()),
            ignored: Vec::new(),
        };

        for (field, rule) in rules {
            let Value::String(template) = rule else {
                return Err(BindingError::NonStringRule {
                    binding: binding.name,
                    field: field.clone(),
                });
            };
            if template == IGNORE_RULE {
                binding.ignored.push(field.clone());
                continue;
            }
            let external = binding.resolve(&matcher, template, placeholders)?;
            binding.mappings.push(Mapping {
                internal: PathKey::parse(field),
                external,
            });
        }

        Ok(binding)
    }

    /// Build a binding from the bound paths declared in `schema`.
    ///
    /// Every leaf field must carry a bound path. A bound path on a nested
    /// field is used as the prefix of its children's paths.
    pub fn from_schema(
        name: impl Into<String>,
        schema: &Schema,
        placeholders: &HashMap<String, String>,
    ) -> Result<Self, BindingError> {
        let mut binding = Binding {
            name: name.into(),
            mappings: Vec::new(),
            ignored: Vec::new(),
        };
        let matcher = Regex::new(PLACEHOLDER)?;

        // (schema, internal prefix, external template prefix)
        let mut pending = vec![(schema, PathKey::default(), None::<String>)];
        while let Some((schema, internal_prefix, external_prefix)) = pending.pop() {
            for field in schema.fields() {
                let internal = internal_prefix.child(Segment::Key(field.name().to_string()));
                let template = match (&external_prefix, field.bound_path()) {
                    (Some(prefix), Some(path)) => Some(format!("{}{}{}", prefix, DEFAULT_SEPARATOR, path)),
                    (None, Some(path)) => Some(path.to_string()),
                    (prefix, None) => prefix.clone().filter(|_| field.nested_schema().is_some()),
                };

                if let Some(nested) = field.nested_schema() {
                    pending.push((nested, internal, template));
                    continue;
                }

                match template {
                    Some(template) if template == IGNORE_RULE => {
                        binding.ignored.push(internal.to_string());
                    }
                    Some(template) => {
                        let external = binding.resolve(&matcher, &template, placeholders)?;
                        binding.mappings.push(Mapping { internal, external });
                    }
                    None => {
                        return Err(BindingError::UnboundField {
                            binding: binding.name,
                            field: internal.to_string(),
                        });
                    }
                }
            }
        }

        if binding.mappings.is_empty() {
            return Err(BindingError::EmptyRules { binding: binding.name });
        }
        Ok(binding)
    }

    fn resolve(
        &self,
        matcher: &Regex,
        template: &str,
        placeholders: &HashMap<String, String>,
    ) -> Result<PathKey, BindingError> {
        let normalised = template.replace('.', DEFAULT_SEPARATOR);

        if let Some(missing) = matcher
            .captures_iter(&normalised)
            .filter_map(|captures| captures.get(1))
            .find(|key| !placeholders.contains_key(key.as_str()))
        {
            return Err(BindingError::UnresolvedPlaceholder {
                binding: self.name.clone(),
                placeholder: missing.as_str().to_string(),
                rule: template.to_string(),
            });
        }

        let resolved = matcher.replace_all(&normalised, |captures: &regex::Captures<'_>| {
            placeholders
                .get(&captures[1])
                .cloned()
                .unwrap_or_default()
        });
        Ok(PathKey::parse(&resolved))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Fields bound with [`IGNORE_RULE`]
    pub fn ignored_fields(&self) -> &[String] {
        &self.ignored
    }

    /// External path bound to an internal field path
    pub fn external_path(&self, internal: &PathKey) -> Option<&PathKey> {
        self.mappings
            .iter()
            .find(|mapping| mapping.internal == *internal)
            .map(|mapping| &mapping.external)
    }

    /// (internal, external) pairs in rule order
    pub fn mappings(&self) -> impl Iterator<Item = (&PathKey, &PathKey)> {
        self.mappings
            .iter()
            .map(|mapping| (&mapping.internal, &mapping.external))
    }

    /// Translate an external document into internal field paths.
    ///
    /// In strict mode every bound external path must be present.
    pub fn receive(&self, document: &Document, strict: bool) -> Result<Document, BindingError> {
        self.translate(document, strict, |m| (&m.external, &m.internal))
    }

    /// Translate internal values into a document keyed by external paths
    pub fn send(&self, values: &Document, strict: bool) -> Result<Document, BindingError> {
        self.translate(values, strict, |m| (&m.internal, &m.external))
    }

    fn translate<F>(&self, source: &Document, strict: bool, direction: F) -> Result<Document, BindingError>
    where
        F: Fn(&Mapping) -> (&PathKey, &PathKey),
    {
        let mut result = Document::new();
        for mapping in &self.mappings {
            let (from, to) = direction(mapping);
            match source.get(from) {
                Ok(value) => result.set(to, value.clone())?,
                Err(_) if !strict => continue,
                Err(_) => {
                    return Err(BindingError::MissingPath {
                        binding: self.name.clone(),
                        path: from.clone(),
                    });
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn device() -> HashMap<String, String> {
        HashMap::from([("device".to_string(), "pump1".to_string())])
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let binding = Binding::new(
            "pump",
            &json!({"temp": "devices.{device}.temperature", "on": "devices:{device}:power"}),
            &device(),
        )
        .unwrap();

        assert_eq!(
            binding.external_path(&PathKey::parse("temp")).unwrap().to_string(),
            "devices:pump1:temperature"
        );
        assert_eq!(
            binding.external_path(&PathKey::parse("on")).unwrap().to_string(),
            "devices:pump1:power"
        );
    }

    #[test]
    fn test_construction_errors() {
        let none = HashMap::new();
        assert!(matches!(
            Binding::new("b", &json!({}), &none),
            Err(BindingError::EmptyRules { .. })
        ));
        assert!(matches!(
            Binding::new("b", &json!({"x": 5}), &none),
            Err(BindingError::NonStringRule { .. })
        ));
        assert!(matches!(
            Binding::new("b", &json!(["x"]), &none),
            Err(BindingError::NotAnObject { .. })
        ));
        let err = Binding::new("b", &json!({"x": "a.{room}.b"}), &none).unwrap_err();
        assert!(matches!(err, BindingError::UnresolvedPlaceholder { ref placeholder, .. } if placeholder == "room"));
    }

    #[test]
    fn test_ignore_rule() {
        let binding = Binding::new("b", &json!({"x": "a.b", "y": IGNORE_RULE}), &HashMap::new()).unwrap();
        assert_eq!(binding.len(), 1);
        assert_eq!(binding.ignored_fields(), ["y".to_string()]);
    }

    #[test]
    fn test_receive_strict_and_lax() {
        let binding = Binding::new("b", &json!({"x": "a.b", "y": "a.c"}), &HashMap::new()).unwrap();
        let partial = Document::from_value(json!({"a": {"b": 1}})).unwrap();

        let received = binding.receive(&partial, false).unwrap();
        assert_eq!(received.into_value(), json!({"x": 1}));

        assert!(matches!(
            binding.receive(&partial, true),
            Err(BindingError::MissingPath { .. })
        ));
    }

    #[test]
    fn test_send_receive_round_trip() {
        let binding = Binding::new(
            "pump",
            &json!({"temp": "devices.{device}.temperature", "state:mode": "devices.{device}.mode"}),
            &device(),
        )
        .unwrap();
        let external = Document::from_value(json!({
            "devices": {"pump1": {"temperature": 21.5, "mode": "auto"}},
            "unrelated": true
        }))
        .unwrap();

        let internal = binding.receive(&external, true).unwrap();
        assert_eq!(internal.into_value(), json!({"temp": 21.5, "state": {"mode": "auto"}}));

        let internal = binding.receive(&external, true).unwrap();
        let back = binding.send(&internal, true).unwrap();
        assert_eq!(
            back.into_value(),
            json!({"devices": {"pump1": {"temperature": 21.5, "mode": "auto"}}})
        );
    }

    #[test]
    fn test_from_schema() {
        let inner = Schema::builder("inner")
            .field(FieldSpec::string("mode").bind("mode"))
            .build()
            .unwrap();
        let schema = Schema::builder("pump")
            .field(FieldSpec::float("temp").bind("devices.{device}.temperature"))
            .field(FieldSpec::nested("settings", inner).bind("devices.{device}.settings"))
            .build()
            .unwrap();

        let binding = Binding::from_schema("pump", &schema, &device()).unwrap();
        assert_eq!(
            binding.external_path(&PathKey::parse("settings:mode")).unwrap().to_string(),
            "devices:pump1:settings:mode"
        );

        let unbound = Schema::builder("partial")
            .field(FieldSpec::float("temp").bind("t"))
            .field(FieldSpec::bool("on"))
            .build()
            .unwrap();
        assert!(matches!(
            Binding::from_schema("partial", &unbound, &HashMap::new()),
            Err(BindingError::UnboundField { ref field, .. }) if field == "on"
        ));
    }
}
