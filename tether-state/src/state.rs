//! Reactive state: validated partial updates with per-field change signals

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use tracing::{debug, error, warn};

use crate::binding::Binding;
use crate::error::StateError;
use crate::schema::{ExtraFields, Schema};
use tether_events::{Signal, SubscriberId};
use tether_json::{Document, PathKey, Segment};

/// Current values of a [`Schema`]'s fields.
///
/// The field set is fixed at construction. Nested fields are owned
/// sub-states; every other field has a change signal emitted with the new
/// value whenever an update changes it.
pub struct ReactiveState {
    schema: Schema,
    values: Mutex<Map<String, Value>>,
    nested: BTreeMap<String, ReactiveState>,
    signals: HashMap<String, Signal<Value>>,
    binding: Option<Binding>,
}

impl ReactiveState {
    /// State with every field at its default
    pub fn new(schema: Schema) -> Self {
        let mut values = Map::new();
        let mut nested = BTreeMap::new();
        let mut signals = HashMap::new();

        for field in schema.fields() {
            match field.nested_schema() {
                Some(sub) => {
                    nested.insert(field.name().to_string(), ReactiveState::new(sub.clone()));
                }
                None => {
                    values.insert(field.name().to_string(), field.initial_value());
                    signals.insert(field.name().to_string(), Signal::new());
                }
            }
        }

        Self {
            schema,
            values: Mutex::new(values),
            nested,
            signals,
            binding: None,
        }
    }

    /// Translate through `binding` in [`Self::send`] and [`Self::receive`]
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn nested(&self, name: &str) -> Option<&ReactiveState> {
        self.nested.get(name)
    }

    /// Current value of a field, nested states as objects
    pub fn get(&self, field: impl Into<PathKey>) -> Option<Value> {
        let path = field.into();
        let (first, rest) = path.segments().split_first()?;
        let Segment::Key(name) = first else {
            return None;
        };

        if let Some(sub) = self.nested.get(name) {
            return if rest.is_empty() {
                Some(sub.snapshot().into_value())
            } else {
                sub.get(PathKey::from(rest.to_vec()))
            };
        }

        let value = self.values.lock().get(name).cloned()?;
        if rest.is_empty() {
            Some(value)
        } else {
            // Descend into object/array fields
            let inner = Document::from_value(Value::Object(Map::from_iter([(name.clone(), value)]))).ok()?;
            inner.get(&path).ok().cloned()
        }
    }

    /// Every field with its internal name
    pub fn snapshot(&self) -> Document {
        let mut root = self.values.lock().clone();
        for (name, sub) in &self.nested {
            root.insert(name.clone(), sub.snapshot().into_value());
        }
        Document::from(root)
    }

    /// Full state, keyed by external paths when a binding is attached
    pub fn send(&self) -> Result<Document, StateError> {
        let snapshot = self.snapshot();
        match &self.binding {
            Some(binding) => Ok(binding.send(&snapshot, false)?),
            None => Ok(snapshot),
        }
    }

    /// Apply an external document, translating it through the binding first
    pub async fn receive(&self, document: &Document) -> Result<Document, StateError> {
        match &self.binding {
            Some(binding) => {
                let internal = binding.receive(document, false)?;
                Ok(self.update(&internal).await)
            }
            None => Ok(self.update(document).await),
        }
    }

    /// Apply a partial update and return the fields that changed.
    ///
    /// Values failing coercion leave their field untouched and are left out
    /// of the result. Unknown names are dropped, or reject the whole update
    /// when the schema forbids extra fields.
    pub async fn update(&self, data: &Document) -> Document {
        Document::from(self.update_map(data.as_map()).await)
    }

    fn update_map<'a>(&'a self, data: &'a Map<String, Value>) -> BoxFuture<'a, Map<String, Value>> {
        async move {
            let mut diff = Map::new();

            if self.schema.extra_fields() == ExtraFields::Forbid {
                if let Some(extra) = data.keys().find(|name| self.schema.field(name).is_none()) {
                    warn!(schema = self.schema.name(), field = %extra, "Rejecting update with undeclared field");
                    return diff;
                }
            }

            for (name, incoming) in data {
                let Some(field) = self.schema.field(name) else {
                    warn!(schema = self.schema.name(), "Extra property received --> {}", name);
                    continue;
                };

                if let Some(sub) = self.nested.get(name) {
                    let Value::Object(sub_data) = incoming else {
                        warn!(schema = self.schema.name(), field = %name, "Nested state expects an object, got {}", incoming);
                        continue;
                    };
                    let sub_diff = sub.update_map(sub_data).await;
                    if !sub_diff.is_empty() {
                        diff.insert(name.clone(), Value::Object(sub_diff));
                    }
                    continue;
                }

                let value = match field.coerce(incoming) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(schema = self.schema.name(), "Rejected update: {}", e);
                        continue;
                    }
                };

                {
                    let mut values = self.values.lock();
                    if values.get(name) == Some(&value) {
                        continue;
                    }
                    let was = values
                        .insert(name.clone(), value.clone())
                        .unwrap_or_default();
                    debug!(schema = self.schema.name(), "Updating {}: {} --> {}", name, was, value);
                }

                diff.insert(name.clone(), value.clone());
                if let Some(signal) = self.signals.get(name) {
                    if let Err(e) = signal.emit(value).await {
                        error!(schema = self.schema.name(), field = %name, "While updating {}: {}", name, e);
                    }
                }
            }

            diff
        }
        .boxed()
    }

    /// Change signal of a leaf field.
    ///
    /// `field` is a name of this state, a `sub:field` path, or a name declared
    /// by one of the nested states.
    pub fn field_signal(&self, field: impl Into<PathKey>) -> Result<&Signal<Value>, StateError> {
        let path = field.into();
        self.resolve_signal(path.segments())
            .map_err(|e| match e {
                StateError::UnknownField(_) => StateError::UnknownField(path.to_string()),
                other => other,
            })
    }

    fn resolve_signal(&self, segments: &[Segment]) -> Result<&Signal<Value>, StateError> {
        match segments {
            [Segment::Key(name)] => {
                if let Some(signal) = self.signals.get(name) {
                    return Ok(signal);
                }
                if self.nested.contains_key(name) {
                    return Err(StateError::NotALeaf(name.clone()));
                }
                self.nested
                    .values()
                    .find_map(|sub| sub.resolve_signal(segments).ok())
                    .ok_or_else(|| StateError::UnknownField(name.clone()))
            }
            [Segment::Key(first), rest @ ..] if !rest.is_empty() => self
                .nested
                .get(first)
                .ok_or_else(|| StateError::UnknownField(first.clone()))?
                .resolve_signal(rest),
            _ => Err(StateError::UnknownField(PathKey::from(segments.to_vec()).to_string())),
        }
    }

    /// Call `callback` with the new value whenever `field` changes
    pub fn after_update<F, Fut>(
        &self,
        field: impl Into<PathKey>,
        id: impl Into<SubscriberId>,
        callback: F,
    ) -> Result<(), StateError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.field_signal(field)?.connect(id, callback);
        Ok(())
    }

    /// Like [`Self::after_update`] with a generated subscriber id
    pub fn bind<F, Fut>(&self, field: impl Into<PathKey>, callback: F) -> Result<SubscriberId, StateError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let path = field.into();
        let id = SubscriberId::unique(&format!("{}:{}", self.schema.name(), path));
        self.after_update(path, id.clone(), callback)?;
        Ok(id)
    }

    /// Put every field back to its default without notifying subscribers
    pub fn reset(&self) {
        {
            let mut values = self.values.lock();
            for field in self.schema.fields() {
                if field.nested_schema().is_none() {
                    values.insert(field.name().to_string(), field.initial_value());
                }
            }
        }
        for sub in self.nested.values() {
            sub.reset();
        }
    }
}

impl fmt::Debug for ReactiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveState")
            .field("schema", &self.schema.name())
            .field("values", &self.snapshot())
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;
    use std::sync::Arc;

    fn pump_schema() -> Schema {
        let limits = Schema::builder("limits")
            .field(FieldSpec::float("max_temp").default_value(80.0).range(0.0, 150.0))
            .field(FieldSpec::bool("alarm"))
            .build()
            .unwrap();
        Schema::builder("pump")
            .field(FieldSpec::integer("rpm").min(0.0))
            .field(FieldSpec::string("mode").default_value("auto"))
            .field(FieldSpec::string("note").nullable())
            .field(FieldSpec::nested("limits", limits))
            .build()
            .unwrap()
    }

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_new_state_holds_defaults() {
        let state = ReactiveState::new(pump_schema());
        assert_eq!(
            state.snapshot().into_value(),
            json!({"rpm": 0, "mode": "auto", "note": "", "limits": {"max_temp": 80.0, "alarm": false}})
        );
        assert_eq!(state.get("limits:max_temp"), Some(json!(80.0)));
        assert_eq!(state.get("missing"), None);
    }

    #[tokio::test]
    async fn test_update_reports_only_changes() {
        let state = ReactiveState::new(pump_schema());

        let diff = state.update(&doc(json!({"rpm": "1200", "mode": "auto"}))).await;
        assert_eq!(diff.into_value(), json!({"rpm": 1200}));

        let again = state.update(&doc(json!({"rpm": 1200.0}))).await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_failed_coercion_keeps_value() {
        let state = ReactiveState::new(pump_schema());
        state.update(&doc(json!({"rpm": 10}))).await;

        let diff = state.update(&doc(json!({"rpm": "fast"}))).await;
        assert!(diff.is_empty());
        assert_eq!(state.get("rpm"), Some(json!(10)));

        let diff = state.update(&doc(json!({"rpm": -1}))).await;
        assert!(diff.is_empty());
        assert_eq!(state.get("rpm"), Some(json!(10)));

        let diff = state.update(&doc(json!({"mode": null, "note": null}))).await;
        assert_eq!(diff.into_value(), json!({"note": null}));
        assert_eq!(state.get("mode"), Some(json!("auto")));
    }

    #[tokio::test]
    async fn test_nested_diff_is_merged_under_field() {
        let state = ReactiveState::new(pump_schema());
        let diff = state
            .update(&doc(json!({"limits": {"alarm": 1, "max_temp": 80}})))
            .await;
        assert_eq!(diff.into_value(), json!({"limits": {"alarm": true}}));

        let diff = state.update(&doc(json!({"limits": 5}))).await;
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn test_extra_fields_ignored_or_forbidden() {
        let state = ReactiveState::new(pump_schema());
        let diff = state.update(&doc(json!({"rpm": 5, "colour": "red"}))).await;
        assert_eq!(diff.into_value(), json!({"rpm": 5}));
        assert_eq!(state.get("colour"), None);

        let strict = Schema::builder("strict")
            .field(FieldSpec::integer("rpm"))
            .extra_fields(ExtraFields::Forbid)
            .build()
            .unwrap();
        let state = ReactiveState::new(strict);
        let diff = state.update(&doc(json!({"rpm": 5, "colour": "red"}))).await;
        assert!(diff.is_empty());
        assert_eq!(state.get("rpm"), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_after_update_receives_new_value() {
        let state = ReactiveState::new(pump_schema());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        state
            .after_update("rpm", "watch-rpm", move |value| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(value);
                    Ok(())
                }
            })
            .unwrap();
        let sink = Arc::clone(&seen);
        state
            .bind("alarm", move |value| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(value);
                    Ok(())
                }
            })
            .unwrap();

        state.update(&doc(json!({"rpm": 7, "limits": {"alarm": true}}))).await;
        state.update(&doc(json!({"rpm": 7}))).await;

        let mut seen = seen.lock().clone();
        seen.sort_by_key(|value| value.to_string());
        assert_eq!(seen, vec![json!(7), json!(true)]);
    }

    #[tokio::test]
    async fn test_subscriber_failure_does_not_block_update() {
        let state = ReactiveState::new(pump_schema());
        state
            .after_update("limits:max_temp", "broken", |_| async { anyhow::bail!("listener crashed") })
            .unwrap();

        let diff = state.update(&doc(json!({"limits": {"max_temp": 90}}))).await;
        assert_eq!(diff.into_value(), json!({"limits": {"max_temp": 90.0}}));
        assert_eq!(state.get("limits:max_temp"), Some(json!(90.0)));
    }

    #[test]
    fn test_subscribing_to_unknown_or_nested_field_fails() {
        let state = ReactiveState::new(pump_schema());
        assert!(matches!(
            state.field_signal("speed"),
            Err(StateError::UnknownField(name)) if name == "speed"
        ));
        assert!(matches!(
            state.field_signal("limits:speed"),
            Err(StateError::UnknownField(name)) if name == "limits:speed"
        ));
        assert!(matches!(state.field_signal("limits"), Err(StateError::NotALeaf(_))));
    }

    #[tokio::test]
    async fn test_binding_translates_send_and_receive() {
        let rules = json!({"rpm": "pumps.{id}.speed", "limits:alarm": "pumps.{id}.alarm"});
        let placeholders = HashMap::from([("id".to_string(), "p7".to_string())]);
        let binding = Binding::new("pump", &rules, &placeholders).unwrap();
        let state = ReactiveState::new(pump_schema()).with_binding(binding);

        let diff = state
            .receive(&doc(json!({"pumps": {"p7": {"speed": 300, "alarm": true}}})))
            .await
            .unwrap();
        assert_eq!(diff.into_value(), json!({"rpm": 300, "limits": {"alarm": true}}));

        assert_eq!(
            state.send().unwrap().into_value(),
            json!({"pumps": {"p7": {"speed": 300, "alarm": true}}})
        );
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let state = ReactiveState::new(pump_schema());
        state
            .update(&doc(json!({"rpm": 9, "limits": {"max_temp": 10}})))
            .await;
        state.reset();
        assert_eq!(state.get("rpm"), Some(json!(0)));
        assert_eq!(state.get("limits:max_temp"), Some(json!(80.0)));
    }
}
