// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic topological ordering of a key subset.

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::cmp::Reverse;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::graph::{DenseGraph, DenseKey};

/// Indicates whether an ordering covered every key or stalled on a cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderCompletion {
    /// Every key was ordered by Kahn's algorithm.
    Complete,
    /// Some keys sit on a cycle inside the subset.
    Stalled {
        /// Number of keys that could not be ordered topologically.
        remaining: usize,
    },
}

/// Dependency order of a subset of graph keys.
///
/// Keys are yielded with dependencies before dependents, considering only
/// edges between keys inside the subset. When several keys are ready at the
/// same time the smallest index wins, so the order is stable across runs.
/// Keys that sit on a cycle cannot be ordered; they follow the acyclic part
/// in ascending index order and are reported through
/// [`completion`](Self::completion).
///
/// # Example
///
/// ```
/// use tributary_dirty::{CycleHandling, DenseGraph, OrderCompletion, TopoOrder};
///
/// let mut graph = DenseGraph::<u32>::new();
/// // 1 <- 2 <- 3, and 0 stands alone
/// graph.add_dependency(2, 1, CycleHandling::Error).unwrap();
/// graph.add_dependency(3, 2, CycleHandling::Error).unwrap();
///
/// let order = TopoOrder::new(&graph, [3, 0, 1, 2]);
/// assert_eq!(order.keys(), &[0, 1, 2, 3]);
/// assert_eq!(order.completion(), OrderCompletion::Complete);
/// ```
#[derive(Clone, Debug)]
pub struct TopoOrder<K> {
    keys: Vec<K>,
    stalled: usize,
}

impl<K: DenseKey + Ord + core::hash::Hash> TopoOrder<K> {
    /// Orders `subset` (duplicates are ignored) against `graph`.
    pub fn new(graph: &DenseGraph<K>, subset: impl IntoIterator<Item = K>) -> Self {
        let mut in_degree: HashMap<K, usize> = HashMap::new();
        let mut unique = Vec::new();
        for key in subset {
            if let Entry::Vacant(e) = in_degree.entry(key) {
                e.insert(0);
                unique.push(key);
            }
        }

        for &key in &unique {
            let deps = graph
                .dependencies(key)
                .iter()
                .filter(|dep| in_degree.contains_key(*dep))
                .count();
            *in_degree.get_mut(&key).expect("key is in in_degree") = deps;
        }

        let mut ready: BinaryHeap<Reverse<K>> = unique
            .iter()
            .copied()
            .filter(|k| in_degree.get(k).is_some_and(|&deg| deg == 0))
            .map(Reverse)
            .collect();

        let mut keys = Vec::with_capacity(unique.len());
        while let Some(Reverse(key)) = ready.pop() {
            in_degree.remove(&key);
            keys.push(key);
            for &dependent in graph.dependents(key) {
                if let Some(deg) = in_degree.get_mut(&dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        let stalled = in_degree.len();
        if stalled > 0 {
            let mut rest: Vec<K> = in_degree.into_keys().collect();
            rest.sort_unstable();
            keys.extend(rest);
        }

        Self { keys, stalled }
    }
}

impl<K> TopoOrder<K> {
    /// Ordered keys; stalled cycle members come last.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Consumes the order and returns the keys.
    #[must_use]
    pub fn into_keys(self) -> Vec<K> {
        self.keys
    }

    /// Whether the whole subset was ordered or a cycle stalled part of it.
    #[must_use]
    pub fn completion(&self) -> OrderCompletion {
        if self.stalled == 0 {
            OrderCompletion::Complete
        } else {
            OrderCompletion::Stalled {
                remaining: self.stalled,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CycleHandling;
    use alloc::vec;

    #[test]
    fn respects_edges_inside_subset_only() {
        let mut g = DenseGraph::<u32>::new();
        // 0 <- 1 <- 2
        g.add_dependency(1, 0, CycleHandling::Error).unwrap();
        g.add_dependency(2, 1, CycleHandling::Error).unwrap();

        // 1 is outside the subset, so 0 and 2 are independent.
        let order = TopoOrder::new(&g, [2, 0]);
        assert_eq!(order.keys(), &[0, 2]);
    }

    #[test]
    fn smallest_ready_key_first() {
        let mut g = DenseGraph::<u32>::new();
        g.add_dependency(5, 9, CycleHandling::Error).unwrap();
        let order = TopoOrder::new(&g, [5, 9, 7, 7]);
        assert_eq!(order.into_keys(), vec![7, 9, 5]);
    }

    #[test]
    fn cycle_members_follow_in_index_order() {
        let mut g = DenseGraph::<u32>::new();
        g.add_dependency(3, 2, CycleHandling::Allow).unwrap();
        g.add_dependency(2, 3, CycleHandling::Allow).unwrap();
        g.add_dependency(2, 0, CycleHandling::Allow).unwrap();

        let order = TopoOrder::new(&g, [0, 2, 3]);
        assert_eq!(order.keys(), &[0, 2, 3]);
        assert_eq!(order.completion(), OrderCompletion::Stalled { remaining: 2 });
    }
}
