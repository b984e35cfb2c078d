//! Path-addressable JSON documents

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::DocumentError;
use crate::iter::DocumentIter;
use crate::path::{ContainerKind, PathKey, Segment, DEFAULT_SEPARATOR};

/// A JSON object addressed by [`PathKey`]s.
///
/// Internal nodes are mappings or sequences; everything else is a leaf.
/// Equality is structural: two documents are equal when they hold the same
/// leaves at the same paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Map<String, Value>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(DocumentError::NotAnObject(kind_name(&other))),
        }
    }

    /// Build a document from a flat mapping, nesting every key on `separator`
    pub fn nested(flat: Map<String, Value>, separator: &str) -> Result<Self, DocumentError> {
        let mut document = Document::new();
        for (key, value) in flat {
            let value = nest_value(value, separator)?;
            document.set(PathKey::from_flat_key(&key, separator), value)?;
        }
        Ok(document)
    }

    /// Decode a document from UTF-8 JSON bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(value)
    }

    /// Encode the document as compact JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(serde_json::to_vec(&self.root)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Whether the document has no top-level entries
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of leaves in the document
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Depth-first iterator over every leaf
    pub fn leaves(&self) -> DocumentIter<'_> {
        DocumentIter::from_map(&self.root)
    }

    /// Top-level keys
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.root.keys()
    }

    /// Look up the value at `path`
    pub fn get(&self, path: impl Into<PathKey>) -> Result<&Value, DocumentError> {
        self.lookup(&path.into())
    }

    /// Look up the value at `path`, falling back to `default`
    pub fn get_or(&self, path: impl Into<PathKey>, default: Value) -> Value {
        self.lookup(&path.into()).cloned().unwrap_or(default)
    }

    /// Mutable lookup of the value at `path`
    pub fn get_mut(&mut self, path: impl Into<PathKey>) -> Result<&mut Value, DocumentError> {
        let path = path.into();
        let (first, rest) = path.segments().split_first().ok_or(DocumentError::EmptyPath)?;
        let mut current = step_root_mut(&mut self.root, first, &path)?;
        for segment in rest {
            current = step_mut(current, segment, &path)?;
        }
        Ok(current)
    }

    pub fn contains(&self, path: impl Into<PathKey>) -> bool {
        self.lookup(&path.into()).is_ok()
    }

    /// Write `value` at `path`, creating intermediate containers as needed.
    ///
    /// An intermediate that is absent, or holds something other than the
    /// container kind the next segment needs, is replaced by a fresh container.
    /// Sequences are padded with null up to the target index.
    pub fn set(&mut self, path: impl Into<PathKey>, value: impl Into<Value>) -> Result<(), DocumentError> {
        let path = path.into();
        let segments = path.segments();
        let first = segments.first().ok_or(DocumentError::EmptyPath)?;
        let Segment::Key(first_key) = first else {
            return Err(mismatch(&path, first, ContainerKind::Sequence, "mapping"));
        };

        let mut current = self.root.entry(first_key.clone()).or_insert(Value::Null);
        for segment in &segments[1..] {
            let wanted = segment.wanted_container();
            if !holds_container(current, wanted) {
                *current = empty_container(wanted);
            }
            current = slot_mut(current, segment, &path)?;
        }
        *current = value.into();
        Ok(())
    }

    /// Remove and return the value at `path`
    pub fn delete(&mut self, path: impl Into<PathKey>) -> Result<Value, DocumentError> {
        let path = path.into();
        let (last, parents) = path.segments().split_last().ok_or(DocumentError::EmptyPath)?;

        let Some((first, rest)) = parents.split_first() else {
            return match last {
                Segment::Key(key) => self.root.remove(key).ok_or_else(|| missing(&path, last)),
                Segment::Index(_) => Err(mismatch(&path, last, ContainerKind::Sequence, "mapping")),
            };
        };

        let mut current = step_root_mut(&mut self.root, first, &path)?;
        for segment in rest {
            current = step_mut(current, segment, &path)?;
        }

        match (current, last) {
            (Value::Object(map), Segment::Key(key)) => {
                map.remove(key).ok_or_else(|| missing(&path, last))
            }
            (Value::Array(items), Segment::Index(index)) if *index < items.len() => {
                Ok(items.remove(*index))
            }
            (Value::Array(_), Segment::Index(_)) => Err(missing(&path, last)),
            (other, segment) => Err(mismatch(&path, segment, segment.wanted_container(), kind_name(other))),
        }
    }

    /// Every leaf keyed by its full path joined with `separator`
    pub fn flatten(&self, separator: &str) -> Map<String, Value> {
        self.leaves()
            .map(|leaf| (leaf.path().to_string_with(separator), leaf.value().clone()))
            .collect()
    }

    /// Flatten with the default `:` separator
    pub fn flattened(&self) -> Map<String, Value> {
        self.flatten(DEFAULT_SEPARATOR)
    }

    /// Re-nest top-level keys that were flattened with `separator`
    pub fn nest(&mut self, separator: &str) -> Result<(), DocumentError> {
        let nested = Document::nested(self.root.clone(), separator)?;
        *self = nested;
        Ok(())
    }

    /// Write every leaf of `other` into this document
    pub fn merge(&mut self, other: &Document) -> Result<(), DocumentError> {
        for leaf in other.leaves() {
            self.set(leaf.path().clone(), leaf.value().clone())?;
        }
        Ok(())
    }

    fn lookup(&self, path: &PathKey) -> Result<&Value, DocumentError> {
        let (first, rest) = path.segments().split_first().ok_or(DocumentError::EmptyPath)?;
        let mut current = match first {
            Segment::Key(key) => self.root.get(key).ok_or_else(|| missing(path, first))?,
            Segment::Index(_) => return Err(mismatch(path, first, ContainerKind::Sequence, "mapping")),
        };
        for segment in rest {
            current = step(current, segment, path)?;
        }
        Ok(current)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        fn covered_by(left: &Document, right: &Document) -> bool {
            left.leaves()
                .all(|leaf| right.lookup(leaf.path()).is_ok_and(|value| value == leaf.value()))
        }

        self.leaf_count() == other.leaf_count() && covered_by(self, other) && covered_by(other, self)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.root) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl FromStr for Document {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.into_value()
    }
}

fn nest_value(value: Value, separator: &str) -> Result<Value, DocumentError> {
    match value {
        Value::Object(map) => Ok(Document::nested(map, separator)?.into_value()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| nest_value(item, separator))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn step<'v>(current: &'v Value, segment: &Segment, path: &PathKey) -> Result<&'v Value, DocumentError> {
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key).ok_or_else(|| missing(path, segment)),
        (Value::Array(items), Segment::Index(index)) => {
            items.get(*index).ok_or_else(|| missing(path, segment))
        }
        (other, segment) => Err(mismatch(path, segment, segment.wanted_container(), kind_name(other))),
    }
}

fn step_mut<'v>(
    current: &'v mut Value,
    segment: &Segment,
    path: &PathKey,
) -> Result<&'v mut Value, DocumentError> {
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            map.get_mut(key).ok_or_else(|| missing(path, segment))
        }
        (Value::Array(items), Segment::Index(index)) => {
            items.get_mut(*index).ok_or_else(|| missing(path, segment))
        }
        (other, segment) => Err(mismatch(path, segment, segment.wanted_container(), kind_name(other))),
    }
}

fn step_root_mut<'v>(
    root: &'v mut Map<String, Value>,
    segment: &Segment,
    path: &PathKey,
) -> Result<&'v mut Value, DocumentError> {
    match segment {
        Segment::Key(key) => root.get_mut(key).ok_or_else(|| missing(path, segment)),
        Segment::Index(_) => Err(mismatch(path, segment, ContainerKind::Sequence, "mapping")),
    }
}

/// Slot for `segment` inside a container already known to be the right kind
fn slot_mut<'v>(
    current: &'v mut Value,
    segment: &Segment,
    path: &PathKey,
) -> Result<&'v mut Value, DocumentError> {
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => Ok(map.entry(key.clone()).or_insert(Value::Null)),
        (Value::Array(items), Segment::Index(index)) => {
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            Ok(&mut items[*index])
        }
        (other, segment) => Err(mismatch(path, segment, segment.wanted_container(), kind_name(other))),
    }
}

fn holds_container(value: &Value, kind: ContainerKind) -> bool {
    matches!(
        (value, kind),
        (Value::Object(_), ContainerKind::Mapping) | (Value::Array(_), ContainerKind::Sequence)
    )
}

fn empty_container(kind: ContainerKind) -> Value {
    match kind {
        ContainerKind::Mapping => Value::Object(Map::new()),
        ContainerKind::Sequence => Value::Array(Vec::new()),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "mapping",
        Value::Array(_) => "sequence",
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}

fn missing(path: &PathKey, segment: &Segment) -> DocumentError {
    DocumentError::MissingKey {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

fn mismatch(path: &PathKey, segment: &Segment, expected: ContainerKind, found: &'static str) -> DocumentError {
    DocumentError::KindMismatch {
        path: path.to_string(),
        segment: segment.to_string(),
        expected: expected.as_str(),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_get_nested_values() {
        let document = doc(json!({"a": {"b": 1, "c": [10, 20]}}));
        assert_eq!(document.get("a:b").unwrap(), &json!(1));
        assert_eq!(document.get("a:c:[1]").unwrap(), &json!(20));
        assert_eq!(document.get_or("a:x", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_get_errors() {
        let document = doc(json!({"a": {"b": 1, "c": [10, 20]}}));
        assert!(document.get("a:x").unwrap_err().is_missing());
        assert!(document.get("a:c:[5]").unwrap_err().is_missing());
        assert!(matches!(
            document.get("a:[0]"),
            Err(DocumentError::KindMismatch { expected: "sequence", found: "mapping", .. })
        ));
        assert!(matches!(
            document.get("a:c:name"),
            Err(DocumentError::KindMismatch { expected: "mapping", found: "sequence", .. })
        ));
        assert!(matches!(document.get(""), Err(DocumentError::EmptyPath)));
    }

    #[test]
    fn test_set_pads_sequence() {
        let mut document = Document::new();
        document.set("a:[2]", "v").unwrap();
        assert_eq!(document.get("a").unwrap(), &json!([null, null, "v"]));
    }

    #[test]
    fn test_set_replaces_mismatched_intermediate() {
        let mut document = doc(json!({"a": 5, "b": {"x": 1}}));
        document.set("a:inner", true).unwrap();
        document.set("b:[0]", 1).unwrap();
        assert_eq!(document.get("a").unwrap(), &json!({"inner": true}));
        assert_eq!(document.get("b").unwrap(), &json!([1]));
    }

    #[test]
    fn test_set_keeps_matching_intermediate() {
        let mut document = doc(json!({"a": {"keep": 1}}));
        document.set("a:new", 2).unwrap();
        assert_eq!(document.get("a").unwrap(), &json!({"keep": 1, "new": 2}));
    }

    #[test]
    fn test_set_rejects_index_at_root() {
        let mut document = Document::new();
        assert!(matches!(
            document.set("[0]", 1),
            Err(DocumentError::KindMismatch { .. })
        ));
        assert!(matches!(document.set("", 1), Err(DocumentError::EmptyPath)));
    }

    #[test]
    fn test_delete() {
        let mut document = doc(json!({"a": {"b": 1, "c": [10, 20, 30]}, "d": 4}));
        assert_eq!(document.delete("a:c:[1]").unwrap(), json!(20));
        assert_eq!(document.get("a:c").unwrap(), &json!([10, 30]));
        assert_eq!(document.delete("d").unwrap(), json!(4));
        assert!(!document.contains("d"));
        assert!(document.delete("a:zzz").unwrap_err().is_missing());
        assert!(document.delete("a:c:[9]").unwrap_err().is_missing());
    }

    #[test]
    fn test_flatten_example() {
        let document = doc(json!({"a": {"b": 1, "c": [10, 20]}}));
        let flat = document.flatten(":");
        let expected = json!({"a:b": 1, "a:c:[0]": 10, "a:c:[1]": 20});
        assert_eq!(Value::Object(flat.clone()), expected);

        let nested = Document::nested(flat, ":").unwrap();
        assert_eq!(nested, document);
        assert_eq!(nested.into_value(), json!({"a": {"b": 1, "c": [10, 20]}}));
    }

    #[test]
    fn test_nest_in_place_recurses_into_arrays() {
        let mut document = doc(json!({"x.y": [{"p.q": 1}], "z": 2}));
        document.nest(".").unwrap();
        assert_eq!(document.get("x:y:[0]:p:q").unwrap(), &json!(1));
        assert_eq!(document.get("z").unwrap(), &json!(2));
    }

    #[test]
    fn test_structural_equality_ignores_construction_order() {
        let mut left = Document::new();
        left.set("a:c:[1]", 20).unwrap();
        left.set("a:c:[0]", 10).unwrap();
        left.set("a:b", 1).unwrap();

        let right = doc(json!({"a": {"b": 1, "c": [10, 20]}}));
        assert_eq!(left, right);
        assert_eq!(right, left);
    }

    #[test]
    fn test_structural_inequality() {
        let left = doc(json!({"a": {"b": 1}}));
        assert_ne!(left, doc(json!({"a": {"b": 2}})));
        assert_ne!(left, doc(json!({"a": {"b": 1}, "c": 3})));
        assert_ne!(doc(json!({"a": {"b": 1}, "c": 3})), left);
    }

    #[test]
    fn test_leaf_count_skips_empty_containers() {
        let document = doc(json!({"a": {}, "b": [], "c": {"d": [1, 2, {}]}}));
        assert_eq!(document.leaf_count(), 2);
        assert!(!document.is_empty());
        assert!(Document::new().is_empty());
    }

    #[test]
    fn test_bytes_round_trip_is_compact() {
        let document = doc(json!({"a": [1, 2], "b": "x"}));
        let bytes = document.to_bytes().unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"a":[1,2],"b":"x"}"#);
        assert_eq!(Document::from_bytes(&bytes).unwrap(), document);
        assert!(matches!(
            Document::from_bytes(b"[1,2]"),
            Err(DocumentError::NotAnObject("sequence"))
        ));
    }

    #[test]
    fn test_merge_overlays_leaves() {
        let mut base = doc(json!({"a": {"b": 1, "c": 2}}));
        base.merge(&doc(json!({"a": {"c": 3}, "d": true}))).unwrap();
        assert_eq!(base, doc(json!({"a": {"b": 1, "c": 3}, "d": true})));
    }

    #[test]
    fn test_get_mut() {
        let mut document = doc(json!({"a": [1, {"b": 2}]}));
        *document.get_mut("a:[1]:b").unwrap() = json!(5);
        assert_eq!(document.get("a:[1]:b").unwrap(), &json!(5));
    }
}
