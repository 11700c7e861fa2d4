// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interning for owned keys.
//!
//! Graph and bit-set APIs in this crate are keyed by dense `u32` indices.
//! Callers usually have structured keys instead (field paths, node labels),
//! so [`Interner`] maps each distinct owned key to a compact [`InternId`],
//! assigned in first-seen order. Interning the same sequence of keys twice
//! therefore yields the same ids, which keeps graphs built from identical
//! declarations identical.
//!
//! ```rust
//! use tributary_dirty::intern::Interner;
//!
//! let mut ids = Interner::<String>::new();
//! let a = ids.intern("profile.name".to_owned());
//! let b = ids.intern("profile.age".to_owned());
//! assert_eq!(ids.intern("profile.name".to_owned()), a);
//! assert_eq!(ids.lookup(&"profile.age".to_owned()), Some(b));
//! assert_eq!(ids.get(a).map(String::as_str), Some("profile.name"));
//! ```

use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::graph::DenseKey;

/// A compact, interned identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct InternId(u32);

impl InternId {
    /// Returns this id as a `usize` index.
    #[inline]
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl DenseKey for InternId {
    #[inline]
    fn index(self) -> u32 {
        self.0
    }

    #[inline]
    fn from_index(index: u32) -> Self {
        Self(index)
    }
}

/// Interns owned keys into compact [`InternId`] handles.
#[derive(Debug, Clone)]
pub struct Interner<K> {
    keys: Vec<K>,
    ids: HashMap<K, InternId>,
}

impl<K> Default for Interner<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Interner<K>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// Returns the number of interned keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the key for `id`, if in range.
    #[must_use]
    pub fn get(&self, id: InternId) -> Option<&K> {
        self.keys.get(id.as_usize())
    }

    /// Returns the id of an already interned key without interning it.
    #[must_use]
    pub fn lookup(&self, key: &K) -> Option<InternId> {
        self.ids.get(key).copied()
    }

    /// Interns `key` and returns its id, reusing the existing id for an
    /// equal key.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` keys are interned.
    pub fn intern(&mut self, key: K) -> InternId {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = InternId(
            u32::try_from(self.keys.len()).expect("too many interned keys for InternId (u32)"),
        );
        self.keys.push(key.clone());
        self.ids.insert(key, id);
        id
    }

    /// Iterates `(id, key)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (InternId, &K)> + '_ {
        self.keys.iter().enumerate().map(|(i, k)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "intern() never hands out ids beyond u32::MAX"
            )]
            let id = InternId(i as u32);
            (id, k)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};

    #[test]
    fn interns_duplicates_to_same_id() {
        let mut i = Interner::<String>::new();
        let a0 = i.intern("a".to_string());
        let a1 = i.intern("a".to_string());
        let b = i.intern("b".to_string());

        assert_eq!(a0, a1);
        assert_ne!(a0, b);
        assert_eq!(i.len(), 2);
        assert_eq!(i.get(b).unwrap(), "b");
    }

    #[test]
    fn ids_follow_first_seen_order() {
        let mut first = Interner::<&str>::new();
        let mut second = Interner::<&str>::new();
        for key in ["x", "y", "x", "z"] {
            first.intern(key);
            second.intern(key);
        }
        let a: Vec<_> = first.iter().map(|(id, k)| (id.index(), *k)).collect();
        let b: Vec<_> = second.iter().map(|(id, k)| (id.index(), *k)).collect();
        assert_eq!(a, b);
        assert_eq!(a, alloc::vec![(0, "x"), (1, "y"), (2, "z")]);
        assert_eq!(first.lookup(&"w"), None);
    }
}
