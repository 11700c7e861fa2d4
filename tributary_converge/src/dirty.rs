// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-transaction dirty sets.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::path::FieldPath;

/// Field paths written by one transaction.
///
/// Merging follows a simple lattice: explicit paths union; `Unknown`
/// absorbs any paths; `All` absorbs everything.
///
/// ```
/// use tributary_converge::DirtySet;
///
/// let mut dirty = DirtySet::new();
/// dirty.mark("a.b".parse().unwrap());
/// assert_eq!(dirty.paths().map(|p| p.len()), Some(1));
///
/// dirty.merge(DirtySet::Unknown);
/// assert!(dirty.is_unknown());
/// dirty.merge(DirtySet::All);
/// assert!(dirty.is_all());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtySet {
    /// Exactly these paths were written.
    Paths(BTreeSet<FieldPath>),
    /// An opaque bulk write; anything may have changed.
    Unknown,
    /// Recompute everything.
    All,
}

impl Default for DirtySet {
    fn default() -> Self {
        Self::Paths(BTreeSet::new())
    }
}

impl DirtySet {
    /// An empty explicit set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a written path. No-op on a sentinel.
    pub fn mark(&mut self, path: FieldPath) {
        if let Self::Paths(paths) = self {
            paths.insert(path);
        }
    }

    /// Downgrades to [`DirtySet::Unknown`] unless already `All`.
    pub fn mark_unknown(&mut self) {
        if !self.is_all() {
            *self = Self::Unknown;
        }
    }

    /// Upgrades to [`DirtySet::All`].
    pub fn mark_all(&mut self) {
        *self = Self::All;
    }

    /// Merges `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        match (&mut *self, other) {
            (Self::All, _) => {}
            (_, Self::All) => *self = Self::All,
            (Self::Unknown, _) => {}
            (_, Self::Unknown) => *self = Self::Unknown,
            (Self::Paths(mine), Self::Paths(theirs)) => mine.extend(theirs),
        }
    }

    /// Returns `true` for an explicit set with no paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Paths(paths) if paths.is_empty())
    }

    /// Returns `true` for the `Unknown` sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns `true` for the `All` sentinel.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The explicit paths, or `None` for a sentinel.
    #[must_use]
    pub fn paths(&self) -> Option<&BTreeSet<FieldPath>> {
        match self {
            Self::Paths(paths) => Some(paths),
            _ => None,
        }
    }

    /// Cache signature of an explicit set: sorted, deduplicated canonical
    /// paths. `None` for a sentinel.
    #[must_use]
    pub fn signature(&self) -> Option<DirtySignature> {
        let paths = self.paths()?;
        let canonical: BTreeSet<FieldPath> = paths.iter().map(FieldPath::canonical).collect();
        Some(DirtySignature(canonical.into_iter().collect()))
    }
}

impl FromIterator<FieldPath> for DirtySet {
    fn from_iter<I: IntoIterator<Item = FieldPath>>(iter: I) -> Self {
        Self::Paths(iter.into_iter().collect())
    }
}

/// Shape of a dirty set, independent of concrete list indices.
///
/// Writes to `items.0.price` and `items.7.price` share a signature, so they
/// share a cached plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DirtySignature(Vec<FieldPath>);

impl DirtySignature {
    /// The canonical paths, sorted.
    #[must_use]
    pub fn paths(&self) -> &[FieldPath] {
        &self.0
    }
}

impl fmt::Display for DirtySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{path}")?;
        }
        Ok(())
    }
}
