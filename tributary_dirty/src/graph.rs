// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency graph over dense keys.

use alloc::vec::Vec;
use core::fmt;

use crate::bitset::DenseIdBitSet;
use crate::scratch::TraversalScratch;

/// A key that maps 1:1 onto a dense `u32` index.
///
/// Graph storage is index-based (arena style): adjacency lists live in a
/// `Vec` indexed by [`DenseKey::index`], so keys must be small and dense.
pub trait DenseKey: Copy + Eq {
    /// Returns the dense index of this key.
    fn index(self) -> u32;

    /// Rebuilds a key from its dense index.
    fn from_index(index: u32) -> Self;
}

impl DenseKey for u32 {
    #[inline]
    fn index(self) -> u32 {
        self
    }

    #[inline]
    fn from_index(index: u32) -> Self {
        index
    }
}

/// Error returned when a cycle would be created by adding a dependency.
#[derive(Clone, PartialEq, Eq)]
pub struct CycleError<K> {
    /// The key that would depend on another.
    pub from: K,
    /// The key that would be depended upon.
    pub to: K,
}

impl<K: fmt::Debug> fmt::Debug for CycleError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CycleError {{ from: {:?}, to: {:?} }}", self.from, self.to)
    }
}

impl<K: fmt::Debug> fmt::Display for CycleError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "adding dependency {:?} -> {:?} would create a cycle",
            self.from, self.to
        )
    }
}

impl<K: fmt::Debug> core::error::Error for CycleError<K> {}

/// How to handle cycle detection when adding dependencies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum CycleHandling {
    /// Return an error if a cycle would be created.
    Error,
    /// Silently ignore the dependency if it would create a cycle.
    Ignore,
    /// Skip cycle detection entirely.
    ///
    /// Derived-state graphs may legitimately contain cycles (two computed
    /// values feeding each other until a fixed point); callers that accept
    /// them rely on visited-set traversal and bounded evaluation instead.
    #[default]
    Allow,
}

/// Dependency graph: "A depends on B" edges between dense keys.
///
/// `DenseGraph` stores both directions, so "what does A depend on?" and
/// "what depends on A?" are slice lookups. Keys are dense indices, see
/// [`DenseKey`].
///
/// # Example
///
/// ```
/// use tributary_dirty::{CycleHandling, DenseGraph};
///
/// let mut graph = DenseGraph::<u32>::new();
/// // 2 depends on 1, 3 depends on 2
/// graph.add_dependency(2, 1, CycleHandling::Error).unwrap();
/// graph.add_dependency(3, 2, CycleHandling::Error).unwrap();
///
/// assert_eq!(graph.dependencies(2), &[1]);
/// assert_eq!(graph.dependents(1), &[2]);
/// assert_eq!(graph.depth(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DenseGraph<K> {
    /// forward[k] -> keys that `k` depends on.
    forward: Vec<Vec<K>>,
    /// reverse[k] -> keys that depend on `k`.
    reverse: Vec<Vec<K>>,
    edges: usize,
}

#[inline]
fn grow<T: Default>(vec: &mut Vec<T>, idx: usize) {
    if idx >= vec.len() {
        vec.resize_with(idx + 1, T::default);
    }
}

impl<K: DenseKey> DenseGraph<K> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            forward: Vec::new(),
            reverse: Vec::new(),
            edges: 0,
        }
    }

    /// Creates an empty graph with room for `keys` keys.
    #[must_use]
    pub fn with_keys(keys: usize) -> Self {
        let mut graph = Self::new();
        graph.forward.resize_with(keys, Vec::new);
        graph.reverse.resize_with(keys, Vec::new);
        graph
    }

    /// Number of key slots (highest known index + 1).
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.forward.len().max(self.reverse.len())
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Adds a dependency: `from` depends on `to`.
    ///
    /// Returns `Ok(true)` if the edge is new and `Ok(false)` if it already
    /// existed or was dropped by [`CycleHandling::Ignore`].
    pub fn add_dependency(
        &mut self,
        from: K,
        to: K,
        handling: CycleHandling,
    ) -> Result<bool, CycleError<K>> {
        if handling != CycleHandling::Allow && (from == to || self.reaches(to, from)) {
            return match handling {
                CycleHandling::Error => Err(CycleError { from, to }),
                CycleHandling::Ignore | CycleHandling::Allow => Ok(false),
            };
        }

        Ok(self.add_edge(from, to))
    }

    /// Adds `from` depends on `to` without any cycle check.
    ///
    /// Returns `true` if the edge is new. Same as [`Self::add_dependency`]
    /// with [`CycleHandling::Allow`], which cannot fail.
    pub fn add_edge(&mut self, from: K, to: K) -> bool {
        let from_idx = from.index() as usize;
        let to_idx = to.index() as usize;
        grow(&mut self.forward, from_idx.max(to_idx));
        grow(&mut self.reverse, from_idx.max(to_idx));

        if self.forward[from_idx].contains(&to) {
            return false;
        }
        self.forward[from_idx].push(to);
        self.reverse[to_idx].push(from);
        self.edges += 1;
        true
    }

    /// Returns `true` if `target` is reachable from `start` along forward
    /// (depends-on) edges.
    fn reaches(&self, start: K, target: K) -> bool {
        let mut visited = DenseIdBitSet::with_capacity(self.key_count());
        let mut stack = alloc::vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if visited.add(current.index()) {
                stack.extend_from_slice(self.dependencies(current));
            }
        }
        false
    }

    /// Direct dependencies of `key`, in insertion order.
    #[inline]
    #[must_use]
    pub fn dependencies(&self, key: K) -> &[K] {
        self.forward
            .get(key.index() as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// Direct dependents of `key`, in insertion order.
    #[inline]
    #[must_use]
    pub fn dependents(&self, key: K) -> &[K] {
        self.reverse
            .get(key.index() as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// Visits every transitive dependent of the `roots` (roots included),
    /// each at most once, using `scratch` for traversal state.
    ///
    /// Terminates on cyclic graphs. Visit order is unspecified; the visited
    /// set is left in `scratch` for the caller to inspect.
    pub fn for_each_affected(
        &self,
        roots: impl IntoIterator<Item = K>,
        scratch: &mut TraversalScratch<K>,
        mut f: impl FnMut(K),
    ) {
        scratch.reset(self.key_count());
        scratch.stack.extend(roots);
        while let Some(next) = scratch.stack.pop() {
            if scratch.visited.add(next.index()) {
                f(next);
                scratch.stack.extend_from_slice(self.dependents(next));
            }
        }
    }

    /// Length of the longest dependency chain, counted in keys.
    ///
    /// Keys that sit on a cycle are layered after every acyclic key, one
    /// layer per stalled key, so a graph with cycles reports a depth large
    /// enough to let a bounded fixed-point loop visit every cycle member.
    /// An empty graph has depth 0; isolated keys have depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        let n = self.key_count();
        if n == 0 {
            return 0;
        }
        let mut in_degree: Vec<usize> = (0..n)
            .map(|i| self.forward.get(i).map_or(0, Vec::len))
            .collect();
        let mut layer = alloc::vec![1_usize; n];
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut done = 0;
        let mut deepest = 0;

        while let Some(i) = ready.pop() {
            done += 1;
            deepest = deepest.max(layer[i]);
            for dependent in self.reverse.get(i).map_or(&[][..], Vec::as_slice) {
                let d = dependent.index() as usize;
                layer[d] = layer[d].max(layer[i] + 1);
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push(d);
                }
            }
        }

        deepest + (n - done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn add_and_query() {
        let mut g = DenseGraph::<u32>::new();
        assert_eq!(g.add_dependency(2, 1, CycleHandling::Error), Ok(true));
        assert_eq!(g.add_dependency(2, 1, CycleHandling::Error), Ok(false));
        assert_eq!(g.add_dependency(2, 0, CycleHandling::Error), Ok(true));

        assert_eq!(g.dependencies(2), &[1, 0]);
        assert_eq!(g.dependents(1), &[2]);
        assert_eq!(g.dependents(7), &[] as &[u32]);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.key_count(), 3);
    }

    #[test]
    fn cycle_detection_error() {
        let mut g = DenseGraph::<u32>::new();
        g.add_dependency(2, 1, CycleHandling::Error).unwrap();
        g.add_dependency(3, 2, CycleHandling::Error).unwrap();

        let err = g.add_dependency(1, 3, CycleHandling::Error).unwrap_err();
        assert_eq!(err.from, 1);
        assert_eq!(err.to, 3);
        assert_eq!(g.add_dependency(1, 1, CycleHandling::Ignore), Ok(false));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn cycles_allowed_by_default() {
        let mut g = DenseGraph::<u32>::new();
        g.add_dependency(0, 1, CycleHandling::default()).unwrap();
        assert_eq!(g.add_dependency(1, 0, CycleHandling::default()), Ok(true));
        assert_eq!(g.dependents(0), &[1]);
        assert_eq!(g.dependents(1), &[0]);
    }

    #[test]
    fn affected_traversal_terminates_on_cycle() {
        let mut g = DenseGraph::<u32>::new();
        // 0 -> 1 -> 2 -> 1
        g.add_dependency(1, 0, CycleHandling::Allow).unwrap();
        g.add_dependency(2, 1, CycleHandling::Allow).unwrap();
        g.add_dependency(1, 2, CycleHandling::Allow).unwrap();
        g.add_dependency(4, 3, CycleHandling::Allow).unwrap();

        let mut scratch = TraversalScratch::new();
        let mut seen = vec![];
        g.for_each_affected([0], &mut scratch, |k| seen.push(k));
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn depth_of_chain_and_cycle() {
        let mut g = DenseGraph::<u32>::new();
        assert_eq!(g.depth(), 0);
        g.add_dependency(1, 0, CycleHandling::Allow).unwrap();
        g.add_dependency(2, 1, CycleHandling::Allow).unwrap();
        assert_eq!(g.depth(), 3);

        // 3 <-> 4 cycle hanging off 2
        g.add_dependency(3, 2, CycleHandling::Allow).unwrap();
        g.add_dependency(4, 3, CycleHandling::Allow).unwrap();
        g.add_dependency(3, 4, CycleHandling::Allow).unwrap();
        assert_eq!(g.depth(), 5);
    }

    #[test]
    fn add_edge_skips_duplicates() {
        let mut g = DenseGraph::<u32>::new();
        assert!(g.add_edge(1, 0));
        assert!(!g.add_edge(1, 0));
        assert!(g.add_edge(0, 1));
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.dependencies(1), &[0]);
    }

    #[test]
    fn with_keys_reports_isolated_depth() {
        let g = DenseGraph::<u32>::with_keys(4);
        assert_eq!(g.key_count(), 4);
        assert_eq!(g.depth(), 1);
    }
}
