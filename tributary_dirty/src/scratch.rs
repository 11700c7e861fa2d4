// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reusable scratch buffers for graph traversals.

use alloc::vec::Vec;

use crate::bitset::DenseIdBitSet;

/// Reusable scratch storage for graph traversals.
///
/// Retains capacity across calls so that a per-instance traversal (one per
/// transaction) does not reallocate its stack and visited set every time.
/// After a traversal, [`visited`](Self::visited) holds every key reached.
///
/// # See Also
///
/// - [`DenseGraph::for_each_affected`](crate::DenseGraph::for_each_affected):
///   Scratch-powered traversal.
#[derive(Debug)]
pub struct TraversalScratch<K> {
    pub(crate) stack: Vec<K>,
    pub(crate) visited: DenseIdBitSet,
}

impl<K> Default for TraversalScratch<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TraversalScratch<K> {
    /// Creates an empty scratch buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            visited: DenseIdBitSet::new(),
        }
    }

    /// Creates an empty scratch buffer sized for `keys` dense keys.
    #[must_use]
    pub fn with_capacity(keys: usize) -> Self {
        Self {
            stack: Vec::with_capacity(keys),
            visited: DenseIdBitSet::with_capacity(keys),
        }
    }

    /// Keys reached by the most recent traversal.
    #[must_use]
    pub fn visited(&self) -> &DenseIdBitSet {
        &self.visited
    }

    pub(crate) fn reset(&mut self, keys: usize) {
        self.stack.clear();
        self.visited.clear();
        if self.visited.capacity() < keys {
            self.visited = DenseIdBitSet::with_capacity(keys);
        }
    }
}
