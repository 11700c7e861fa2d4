// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reading and writing `serde_json` state trees by [`FieldPath`], and the
//! schema of known field paths.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::{FieldPath, Segment};

/// Shared `null` returned for missing dependency values.
pub(crate) static NULL: Value = Value::Null;

/// Error returned when a write cannot be applied to the state tree.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WriteError {
    /// A segment would have to descend into a scalar.
    #[error("`{at}` is not a container")]
    NotAContainer {
        /// Path of the scalar in the way.
        at: FieldPath,
    },
    /// A concrete index is past the end of its list.
    #[error("index {index} is out of bounds at `{at}` (len {len})")]
    OutOfBounds {
        /// Path of the list.
        at: FieldPath,
        /// Requested index.
        index: usize,
        /// Current list length.
        len: usize,
    },
    /// `[]` cannot be written; it does not address one location.
    #[error("`{0}` is not a concrete path")]
    NotConcrete(FieldPath),
}

/// Returns the value at `path`, or `None` if any segment is missing.
///
/// `[]` segments never resolve; use a concrete index instead.
#[must_use]
pub fn get<'a>(state: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = state;
    for segment in path.segments() {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating missing (or `null`) objects along the
/// way. Returns the previous value, if there was one.
///
/// Writing the root path replaces the whole state.
pub fn set(state: &mut Value, path: &FieldPath, value: Value) -> Result<Option<Value>, WriteError> {
    if path.item_depth() > 0 {
        return Err(WriteError::NotConcrete(path.clone()));
    }
    let Some((last, parents)) = path.segments().split_last() else {
        return Ok(Some(std::mem::replace(state, value)));
    };

    let mut current = state;
    for (depth, segment) in parents.iter().enumerate() {
        current = step_mut(current, segment, || path.prefix(depth))?;
    }

    match (last, current) {
        (Segment::Key(key), Value::Object(map)) => Ok(map.insert(key.clone(), value)),
        (Segment::Key(key), slot @ Value::Null) => {
            let mut map = Map::new();
            map.insert(key.clone(), value);
            *slot = Value::Object(map);
            Ok(None)
        }
        (Segment::Index(index), Value::Array(items)) => {
            let len = items.len();
            match items.get_mut(*index) {
                Some(slot) => Ok(Some(std::mem::replace(slot, value))),
                None if *index == len => {
                    items.push(value);
                    Ok(None)
                }
                None => Err(WriteError::OutOfBounds {
                    at: path.prefix(path.len() - 1),
                    index: *index,
                    len,
                }),
            }
        }
        _ => Err(WriteError::NotAContainer {
            at: path.prefix(path.len() - 1),
        }),
    }
}

fn step_mut<'a>(
    current: &'a mut Value,
    segment: &Segment,
    at: impl Fn() -> FieldPath,
) -> Result<&'a mut Value, WriteError> {
    if current.is_null() && matches!(segment, Segment::Key(_)) {
        *current = Value::Object(Map::new());
    }
    match (segment, current) {
        (Segment::Key(key), Value::Object(map)) => {
            Ok(map.entry(key.clone()).or_insert(Value::Null))
        }
        (Segment::Index(index), Value::Array(items)) => {
            let len = items.len();
            items.get_mut(*index).ok_or_else(|| WriteError::OutOfBounds {
                at: at(),
                index: *index,
                len,
            })
        }
        _ => Err(WriteError::NotAContainer { at: at() }),
    }
}

/// The set of field paths a module's state is known to have.
///
/// Paths are stored in canonical form (`items[].price`). Every ancestor of a
/// known path is known too. Dependency declarations are checked against the
/// schema when a dependency graph is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateSchema {
    paths: BTreeSet<FieldPath>,
}

impl StateSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every path present in `state`. List elements contribute
    /// their shapes under `[]`.
    #[must_use]
    pub fn from_value(state: &Value) -> Self {
        let mut schema = Self::new();
        schema.collect(&FieldPath::root(), state);
        schema
    }

    fn collect(&mut self, at: &FieldPath, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = at.child(key);
                    self.paths.insert(path.clone());
                    self.collect(&path, child);
                }
            }
            Value::Array(items) => {
                let item = at.item();
                if !items.is_empty() {
                    self.paths.insert(item.clone());
                }
                for child in items {
                    self.collect(&item, child);
                }
            }
            _ => {}
        }
    }

    /// Adds `path` (canonicalized) and all of its ancestors.
    pub fn insert(&mut self, path: &FieldPath) {
        let canonical = path.canonical();
        for len in 1..=canonical.len() {
            self.paths.insert(canonical.prefix(len));
        }
    }

    /// Returns `true` if `path` (canonicalized) is known. The root is always
    /// known.
    #[must_use]
    pub fn contains(&self, path: &FieldPath) -> bool {
        path.is_root() || self.paths.contains(&path.canonical())
    }

    /// Iterates the known paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldPath> + '_ {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn get_walks_objects_and_lists() {
        let state = json!({ "a": { "b": 1 }, "items": [{ "price": 2 }] });
        assert_eq!(get(&state, &p("a.b")), Some(&json!(1)));
        assert_eq!(get(&state, &p("items.0.price")), Some(&json!(2)));
        assert_eq!(get(&state, &p("items.1.price")), None);
        assert_eq!(get(&state, &p("items[].price")), None);
        assert_eq!(get(&state, &p("")), Some(&state));
    }

    #[test]
    fn set_creates_missing_objects() {
        let mut state = json!({});
        assert_eq!(set(&mut state, &p("a.b.c"), json!(3)), Ok(None));
        assert_eq!(state, json!({ "a": { "b": { "c": 3 } } }));
        assert_eq!(set(&mut state, &p("a.b.c"), json!(4)), Ok(Some(json!(3))));
    }

    #[test]
    fn set_into_lists() {
        let mut state = json!({ "items": [{ "qty": 1 }] });
        set(&mut state, &p("items.0.total"), json!(10)).unwrap();
        set(&mut state, &p("items.1"), json!({ "qty": 2 })).unwrap();
        assert_eq!(state, json!({ "items": [{ "qty": 1, "total": 10 }, { "qty": 2 }] }));

        let err = set(&mut state, &p("items.5.total"), json!(0)).unwrap_err();
        assert!(matches!(err, WriteError::OutOfBounds { index: 5, len: 2, .. }));
    }

    #[test]
    fn set_rejects_scalars_and_item_paths() {
        let mut state = json!({ "a": 1 });
        assert_eq!(
            set(&mut state, &p("a.b"), json!(2)),
            Err(WriteError::NotAContainer { at: p("a") })
        );
        assert!(matches!(
            set(&mut state, &p("items[].x"), json!(2)),
            Err(WriteError::NotConcrete(_))
        ));
    }

    #[test]
    fn root_write_replaces_state() {
        let mut state = json!({ "a": 1 });
        let old = set(&mut state, &FieldPath::root(), json!({ "b": 2 })).unwrap();
        assert_eq!(old, Some(json!({ "a": 1 })));
        assert_eq!(state, json!({ "b": 2 }));
    }

    #[test]
    fn schema_from_value() {
        let schema = StateSchema::from_value(&json!({
            "profile": { "name": "x" },
            "items": [{ "price": 1 }, { "qty": 2 }],
            "empty": []
        }));
        for known in ["profile", "profile.name", "items", "items[]", "items[].price", "items[].qty", "empty"] {
            assert!(schema.contains(&p(known)), "{known} missing");
        }
        assert!(schema.contains(&p("items.7.price")));
        assert!(!schema.contains(&p("profile.age")));
        assert!(!schema.contains(&p("empty[].x")));
    }

    #[test]
    fn schema_insert_adds_ancestors() {
        let mut schema = StateSchema::new();
        schema.insert(&p("summary.totals.net"));
        assert!(schema.contains(&p("summary")));
        assert!(schema.contains(&p("summary.totals")));
        assert!(schema.contains(&p("summary.totals.net")));
    }
}
