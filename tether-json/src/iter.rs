//! Depth-first, leaf-only document traversal.
//!
//! The iterator keeps an explicit stack of frames (the segment a container
//! sits under plus a cursor into it) instead of recursing, so traversal depth
//! is bounded by heap rather than by the call stack.

use serde_json::{map, Value};
use std::iter::Enumerate;
use std::slice;

use crate::path::{PathKey, Segment};

/// A leaf reached by a full path
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf<'a> {
    path: PathKey,
    value: &'a Value,
}

impl<'a> Leaf<'a> {
    /// Full path of the leaf
    pub fn path(&self) -> &PathKey {
        &self.path
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Last segment of the path
    pub fn field(&self) -> &Segment {
        // Leaves are always reached through at least one segment
        &self.path.segments()[self.path.len() - 1]
    }

    /// Path of the container holding the leaf
    pub fn domain(&self) -> PathKey {
        self.path.parent()
    }

    /// Number of segments in the leaf path
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn into_parts(self) -> (PathKey, &'a Value) {
        (self.path, self.value)
    }
}

enum Cursor<'a> {
    Mapping(map::Iter<'a>),
    Sequence(Enumerate<slice::Iter<'a, Value>>),
}

struct Frame<'a> {
    segment: Option<Segment>,
    cursor: Cursor<'a>,
}

impl<'a> Frame<'a> {
    fn open(segment: Option<Segment>, container: &'a Value) -> Option<Self> {
        let cursor = match container {
            Value::Object(map) => Cursor::Mapping(map.iter()),
            Value::Array(items) => Cursor::Sequence(items.iter().enumerate()),
            _ => return None,
        };
        Some(Self { segment, cursor })
    }

    fn advance(&mut self) -> Option<(Segment, &'a Value)> {
        match &mut self.cursor {
            Cursor::Mapping(iter) => iter
                .next()
                .map(|(key, value)| (Segment::Key(key.clone()), value)),
            Cursor::Sequence(iter) => iter
                .next()
                .map(|(index, value)| (Segment::Index(index), value)),
        }
    }
}

/// Iterator over every leaf of a JSON tree
pub struct DocumentIter<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> DocumentIter<'a> {
    /// Traverse the leaves below `root`. A scalar root yields nothing.
    pub fn new(root: &'a Value) -> Self {
        Self {
            stack: Frame::open(None, root).into_iter().collect(),
        }
    }

    pub(crate) fn from_map(root: &'a map::Map<String, Value>) -> Self {
        Self {
            stack: vec![Frame {
                segment: None,
                cursor: Cursor::Mapping(root.iter()),
            }],
        }
    }

    fn current_path(&self, leaf: Segment) -> PathKey {
        self.stack
            .iter()
            .filter_map(|frame| frame.segment.clone())
            .chain(std::iter::once(leaf))
            .collect()
    }
}

impl<'a> Iterator for DocumentIter<'a> {
    type Item = Leaf<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some((segment, value)) = frame.advance() else {
                self.stack.pop();
                continue;
            };

            match value {
                Value::Object(_) | Value::Array(_) => {
                    // Empty containers are pushed and popped on the next turn
                    if let Some(frame) = Frame::open(Some(segment), value) {
                        self.stack.push(frame);
                    }
                }
                leaf => {
                    return Some(Leaf {
                        path: self.current_path(segment),
                        value: leaf,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yields_only_leaves_in_depth_first_order() {
        let value = json!({"a": {"b": 1, "c": [10, 20]}, "d": "x"});
        let paths: Vec<String> = DocumentIter::new(&value)
            .map(|leaf| leaf.path().to_string())
            .collect();
        assert_eq!(paths, vec!["a:b", "a:c:[0]", "a:c:[1]", "d"]);
    }

    #[test]
    fn test_empty_containers_are_skipped() {
        let value = json!({"a": {}, "b": [], "c": [[], {}, 3], "d": {"e": {}}});
        let leaves: Vec<_> = DocumentIter::new(&value).collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].path().to_string(), "c:[2]");
        assert_eq!(leaves[0].value(), &json!(3));
    }

    #[test]
    fn test_leaf_accessors() {
        let value = json!({"a": {"b": [null, true]}});
        let leaf = DocumentIter::new(&value).nth(1).unwrap();
        assert_eq!(leaf.field(), &Segment::Index(1));
        assert_eq!(leaf.domain().to_string(), "a:b");
        assert_eq!(leaf.depth(), 3);
        assert_eq!(leaf.value(), &json!(true));
    }

    #[test]
    fn test_scalar_root_yields_nothing() {
        let value = json!(42);
        assert_eq!(DocumentIter::new(&value).count(), 0);
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let mut value = json!(1);
        for _ in 0..2_000 {
            value = json!({ "n": value });
        }
        let leaves: Vec<_> = DocumentIter::new(&value).collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].depth(), 2_000);
    }
}
