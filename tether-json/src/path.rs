//! Path keys addressing locations inside a [`Document`](crate::Document).
//!
//! A path is an ordered list of segments. A segment is either a mapping key
//! or a bracketed sequence index, so `a:b:[2]` addresses the third element of
//! the sequence stored under `b` inside `a`.

use std::fmt;

/// Default separator between path segments
pub const DEFAULT_SEPARATOR: &str = ":";

/// Kind of container a segment can be applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Mapping,
    Sequence,
}

impl ContainerKind {
    /// Human readable name used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Mapping => "mapping",
            ContainerKind::Sequence => "sequence",
        }
    }
}

/// A single path segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Mapping key
    Key(String),
    /// Sequence position
    Index(usize),
}

impl Segment {
    /// Parse a raw segment. `[n]` becomes an index, anything else a key.
    pub fn parse(raw: &str) -> Self {
        if raw.len() >= 3 && raw.starts_with('[') && raw.ends_with(']') {
            if let Ok(index) = raw[1..raw.len() - 1].parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Key(raw.to_string())
    }

    /// Whether this segment addresses a sequence position
    pub fn is_index(&self) -> bool {
        matches!(self, Segment::Index(_))
    }

    /// The container kind this segment must be applied to
    pub fn wanted_container(&self) -> ContainerKind {
        match self {
            Segment::Key(_) => ContainerKind::Mapping,
            Segment::Index(_) => ContainerKind::Sequence,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// Ordered sequence of segments addressing a document location
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathKey {
    segments: Vec<Segment>,
}

impl PathKey {
    /// Parse a path using the default `:` separator
    pub fn parse(raw: &str) -> Self {
        Self::parse_with(raw, DEFAULT_SEPARATOR)
    }

    /// Parse a path splitting on a custom separator
    pub fn parse_with(raw: &str, separator: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        Self {
            segments: raw.split(separator).map(Segment::parse).collect(),
        }
    }

    /// Split a key produced by `Document::flatten`.
    ///
    /// Unlike [`PathKey::parse_with`], an empty key is the single empty
    /// segment it was flattened from.
    pub fn from_flat_key(raw: &str, separator: &str) -> Self {
        Self {
            segments: raw.split(separator).map(Segment::parse).collect(),
        }
    }

    /// Build a path from pre-split raw segments
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            segments: parts.into_iter().map(|p| Segment::parse(p.as_ref())).collect(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, the field name of a leaf
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Path without its last segment
    pub fn parent(&self) -> PathKey {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Append a segment in place
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// New path with `segment` appended
    pub fn child(&self, segment: Segment) -> PathKey {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// Path with `other` appended
    pub fn join(&self, other: &PathKey) -> PathKey {
        let mut path = self.clone();
        path.segments.extend(other.segments.iter().cloned());
        path
    }

    /// Render the path with a custom separator
    pub fn to_string_with(&self, separator: &str) -> String {
        self.segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(DEFAULT_SEPARATOR))
    }
}

impl From<&str> for PathKey {
    fn from(raw: &str) -> Self {
        PathKey::parse(raw)
    }
}

impl From<String> for PathKey {
    fn from(raw: String) -> Self {
        PathKey::parse(&raw)
    }
}

impl From<&String> for PathKey {
    fn from(raw: &String) -> Self {
        PathKey::parse(raw)
    }
}

impl From<Vec<Segment>> for PathKey {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl From<&PathKey> for PathKey {
    fn from(path: &PathKey) -> Self {
        path.clone()
    }
}

impl FromIterator<Segment> for PathKey {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PathKey {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_parsing() {
        assert_eq!(Segment::parse("[2]"), Segment::Index(2));
        assert_eq!(Segment::parse("name"), Segment::Key("name".to_string()));
        // Too short or not numeric stays a key
        assert_eq!(Segment::parse("[]"), Segment::Key("[]".to_string()));
        assert_eq!(Segment::parse("[x]"), Segment::Key("[x]".to_string()));
        assert_eq!(Segment::parse("[-1]"), Segment::Key("[-1]".to_string()));
    }

    #[test]
    fn test_path_parse_and_display() {
        let path = PathKey::parse("a:b:[2]");
        assert_eq!(path.len(), 3);
        assert_eq!(path.segments()[2], Segment::Index(2));
        assert_eq!(path.to_string(), "a:b:[2]");
        assert_eq!(path.to_string_with("/"), "a/b/[2]");
    }

    #[test]
    fn test_custom_separator_and_parts() {
        let dotted = PathKey::parse_with("a.b.[0]", ".");
        let parts = PathKey::from_parts(["a", "b", "[0]"]);
        assert_eq!(dotted, parts);
        assert!(PathKey::parse("").is_empty());
    }

    #[test]
    fn test_flat_key_keeps_empty_segments() {
        assert_eq!(PathKey::from_flat_key("", ":").segments(), &[Segment::Key(String::new())]);
        assert_eq!(PathKey::from_flat_key("a:", ":").len(), 2);
        assert_eq!(PathKey::from_flat_key("a:[1]", ":"), PathKey::parse("a:[1]"));
    }

    #[test]
    fn test_parent_and_child() {
        let path = PathKey::parse("a:b");
        assert_eq!(path.parent(), PathKey::parse("a"));
        assert_eq!(path.child(Segment::Index(1)).to_string(), "a:b:[1]");
        assert_eq!(path.last(), Some(&Segment::Key("b".to_string())));
    }
}
