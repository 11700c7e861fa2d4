// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Affected-node closure of a set of changed paths.

use tributary_dirty::TraversalScratch;

use crate::graph::{DependencyGraph, NodeId};
use crate::path::FieldPath;

/// Returns every node that may change when `changed` paths are written:
/// the direct readers of each path plus all of their transitive dependents.
///
/// The result is sorted and duplicate-free. Cycles terminate.
#[must_use]
pub fn reverse_closure<'a>(
    graph: &DependencyGraph,
    changed: impl IntoIterator<Item = &'a FieldPath>,
) -> Vec<NodeId> {
    let mut scratch = TraversalScratch::with_capacity(graph.node_count());
    reverse_closure_with(graph, changed, &mut scratch)
}

/// Like [`reverse_closure`], reusing `scratch` across calls.
pub fn reverse_closure_with<'a>(
    graph: &DependencyGraph,
    changed: impl IntoIterator<Item = &'a FieldPath>,
    scratch: &mut TraversalScratch<NodeId>,
) -> Vec<NodeId> {
    let mut roots = Vec::new();
    for path in changed {
        graph.for_each_reader(path, |node| roots.push(node));
    }
    let mut out = Vec::new();
    graph
        .node_graph()
        .for_each_affected(roots, scratch, |node| out.push(node));
    out.sort_unstable();
    out
}
