// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mutable drafts that record what a reducer wrote.

use serde_json::Value;
use tributary_converge::{DirtySet, FieldPath, state};

use crate::error::DraftError;

/// A copy of instance state being edited by one transaction.
///
/// Every write is recorded in the draft's [`DirtySet`]; whole-state
/// replacement records an unknown write.
#[derive(Clone, Debug)]
pub struct StateDraft {
    state: Value,
    dirty: DirtySet,
}

impl StateDraft {
    /// Starts a draft from `base`.
    #[must_use]
    pub fn new(base: Value) -> Self {
        Self {
            state: base,
            dirty: DirtySet::new(),
        }
    }

    /// Current draft state.
    #[must_use]
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Value at `path`, if present.
    pub fn get(&self, path: &str) -> Result<Option<&Value>, DraftError> {
        Ok(state::get(&self.state, &path.parse()?))
    }

    /// Writes `value` at `path`.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), DraftError> {
        self.set_path(path.parse()?, value)
    }

    /// Writes `value` at an already parsed `path`.
    pub fn set_path(&mut self, path: FieldPath, value: Value) -> Result<(), DraftError> {
        state::set(&mut self.state, &path, value)?;
        if path.is_root() {
            self.dirty.mark_unknown();
        } else {
            self.dirty.mark(path);
        }
        Ok(())
    }

    /// Replaces the value at `path` with `f(current)`; missing values read
    /// as `null`.
    pub fn update(&mut self, path: &str, f: impl FnOnce(&Value) -> Value) -> Result<(), DraftError> {
        let path: FieldPath = path.parse()?;
        let next = f(state::get(&self.state, &path).unwrap_or(&Value::Null));
        self.set_path(path, next)
    }

    /// Replaces the whole state. Recorded as an unknown write.
    pub fn replace(&mut self, next: Value) {
        self.state = next;
        self.dirty.mark_unknown();
    }

    /// Asks for a full recompute regardless of what was written.
    pub fn mark_all(&mut self) {
        self.dirty.mark_all();
    }

    /// What was written so far.
    #[must_use]
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Final state and dirty set.
    #[must_use]
    pub fn into_parts(self) -> (Value, DirtySet) {
        (self.state, self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_are_recorded() {
        let mut draft = StateDraft::new(json!({ "count": 1, "items": [{ "qty": 1 }] }));
        draft.update("count", |v| json!(v.as_i64().unwrap_or(0) + 1)).unwrap();
        draft.set("items.0.qty", json!(3)).unwrap();
        assert_eq!(draft.get("count").unwrap(), Some(&json!(2)));

        let (state, dirty) = draft.into_parts();
        assert_eq!(state["items"][0]["qty"], json!(3));
        let paths: Vec<_> = dirty.paths().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(paths, ["count", "items.0.qty"]);
    }

    #[test]
    fn replace_is_an_unknown_write() {
        let mut draft = StateDraft::new(json!({ "a": 1 }));
        draft.set("a", json!(2)).unwrap();
        draft.replace(json!({ "a": 3 }));
        assert!(draft.dirty().is_unknown());
        draft.set("a", json!(4)).unwrap();
        assert!(draft.dirty().is_unknown());
    }

    #[test]
    fn bad_paths_and_writes_fail() {
        let mut draft = StateDraft::new(json!({ "a": 1 }));
        assert!(matches!(draft.set("a..b", json!(0)), Err(DraftError::Path(_))));
        assert!(matches!(draft.set("a.b", json!(0)), Err(DraftError::Write(_))));
        assert!(draft.dirty().is_empty());
    }
}
