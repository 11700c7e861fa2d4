// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Field paths into a state tree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

/// Most paths are a handful of segments deep.
const INLINE_SEGMENTS: usize = 4;

/// One step of a [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Object member.
    Key(String),
    /// Concrete list element.
    Index(usize),
    /// Any list element (`[]`): the canonical item shape of a list.
    Item,
}

impl Segment {
    /// Returns `true` if both segments can address the same location.
    ///
    /// [`Segment::Item`] matches any index; keys and indices match only
    /// themselves.
    #[inline]
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Key(a), Self::Key(b)) => a == b,
            (Self::Index(a), Self::Index(b)) => a == b,
            (Self::Item, Self::Index(_) | Self::Item) | (Self::Index(_), Self::Item) => true,
            _ => false,
        }
    }
}

/// Error returned by [`FieldPath::parse`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PathParseError {
    /// Two dots in a row, or a leading/trailing dot.
    #[error("empty segment in path `{0}`")]
    EmptySegment(String),
    /// A `[` that is not the `[]` item marker.
    #[error("malformed item marker in path `{0}`")]
    MalformedItem(String),
}

/// Location in the state tree.
///
/// Paths are written as dotted strings. Numeric segments address concrete
/// list elements and `[]` addresses the item shape of a list:
///
/// ```
/// use tributary_converge::FieldPath;
///
/// let concrete: FieldPath = "items.2.price".parse().unwrap();
/// let item: FieldPath = "items[].price".parse().unwrap();
///
/// assert_eq!(concrete.canonical(), item);
/// assert!(concrete.overlaps(&item));
/// assert!(item.overlaps(&"items".parse().unwrap()));
/// assert_eq!(item.to_string(), "items[].price");
/// ```
///
/// The empty string is the root path (the whole state).
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: SmallVec<[Segment; INLINE_SEGMENTS]>,
}

impl FieldPath {
    /// The root path.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dotted path string.
    pub fn parse(text: &str) -> Result<Self, PathParseError> {
        let mut segments = SmallVec::new();
        if text.is_empty() {
            return Ok(Self { segments });
        }
        for part in text.split('.') {
            let (name, item) = match part.find('[') {
                Some(at) if &part[at..] == "[]" => (&part[..at], true),
                Some(_) => return Err(PathParseError::MalformedItem(text.to_string())),
                None => (part, false),
            };
            if name.is_empty() && !item {
                return Err(PathParseError::EmptySegment(text.to_string()));
            }
            if !name.is_empty() {
                segments.push(match name.parse::<usize>() {
                    Ok(index) => Segment::Index(index),
                    Err(_) => Segment::Key(name.to_string()),
                });
            }
            if item {
                segments.push(Segment::Item);
            }
        }
        Ok(Self { segments })
    }

    /// The path's segments, root first.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns a copy with `key` appended.
    #[must_use]
    pub fn child(&self, key: &str) -> Self {
        let mut out = self.clone();
        out.segments.push(Segment::Key(key.to_string()));
        out
    }

    /// Returns a copy with a concrete `index` appended.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut out = self.clone();
        out.segments.push(Segment::Index(index));
        out
    }

    /// Returns a copy with `[]` appended.
    #[must_use]
    pub fn item(&self) -> Self {
        let mut out = self.clone();
        out.segments.push(Segment::Item);
        out
    }

    /// The first `len` segments.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments[..len.min(self.segments.len())].iter().cloned().collect(),
        }
    }

    /// Returns the path with every concrete index replaced by `[]`.
    #[must_use]
    pub fn canonical(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Index(_) => Segment::Item,
                    other => other.clone(),
                })
                .collect(),
        }
    }

    /// Returns `true` if the path contains no concrete index.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        !self.segments.iter().any(|s| matches!(s, Segment::Index(_)))
    }

    /// Number of `[]` segments.
    #[must_use]
    pub fn item_depth(&self) -> usize {
        self.segments.iter().filter(|s| **s == Segment::Item).count()
    }

    /// The list path in front of the first `[]`, if any.
    ///
    /// For `items[].total` this is `items`.
    #[must_use]
    pub fn list_scope(&self) -> Option<Self> {
        let at = self.segments.iter().position(|s| *s == Segment::Item)?;
        Some(self.prefix(at))
    }

    /// Replaces the first `[]` with a concrete `index`.
    #[must_use]
    pub fn at_index(&self, index: usize) -> Self {
        let mut out = self.clone();
        if let Some(slot) = out.segments.iter_mut().find(|s| **s == Segment::Item) {
            *slot = Segment::Index(index);
        }
        out
    }

    /// Returns `true` if `prefix` addresses this path or one of its
    /// ancestors, with `[]` matching any index.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        prefix.len() <= self.len()
            && prefix
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| a.matches(b))
    }

    /// Returns `true` if a write to one path can change the value at the
    /// other: one is an ancestor of (or equal to) the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Item => f.write_str("[]")?,
                Segment::Key(key) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                Segment::Index(index) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "{index}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({self})")
    }
}

impl FromStr for FieldPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn parse_and_display() {
        for text in ["", "a", "a.b", "items[].price", "items.3.price", "grid[]"] {
            assert_eq!(p(text).to_string(), text);
        }
        assert_eq!(
            p("items[].price").segments(),
            &[
                Segment::Key("items".into()),
                Segment::Item,
                Segment::Key("price".into())
            ]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            FieldPath::parse("a..b"),
            Err(PathParseError::EmptySegment(_))
        ));
        assert!(matches!(
            FieldPath::parse("a[0].b"),
            Err(PathParseError::MalformedItem(_))
        ));
    }

    #[test]
    fn overlap_rules() {
        assert!(p("a").overlaps(&p("a.b")));
        assert!(p("a.b").overlaps(&p("a")));
        assert!(!p("a.b").overlaps(&p("a.c")));
        assert!(p("items.1.price").overlaps(&p("items[].price")));
        assert!(!p("items.1.price").overlaps(&p("items.2.price")));
        assert!(!p("items[].qty").overlaps(&p("items[].price")));
        assert!(p("").overlaps(&p("anything.at.all")));
    }

    #[test]
    fn list_scope_and_index() {
        let item = p("items[].total");
        assert_eq!(item.list_scope(), Some(p("items")));
        assert_eq!(item.at_index(4), p("items.4.total"));
        assert_eq!(item.item_depth(), 1);
        assert!(item.is_canonical());
        assert!(!p("items.4").is_canonical());
        assert_eq!(p("a.b").list_scope(), None);
    }

    #[test]
    fn serde_uses_string_form() {
        let path = p("items[].price");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"items[].price\"");
        let back: FieldPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
