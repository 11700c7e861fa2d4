// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The convergence executor.
//!
//! Evaluates the nodes of a plan's scope in dependency order against a state
//! tree, writing changed results back. A write that dirties a node already
//! evaluated in the current pass queues that node for another pass; passes
//! are capped at the graph depth.

use std::time::Instant;

use serde::Serialize;
use serde_json::{Value, json};
use smallvec::SmallVec;
use tributary_dirty::{DenseIdBitSet, DenseKey, TopoOrder};

use crate::decl::EqualsFn;
use crate::dirty::DirtySet;
use crate::error::ConvergeError;
use crate::graph::{DependencyGraph, Node, NodeEval, NodeId};
use crate::path::FieldPath;
use crate::plan::{ConvergePlan, PlanScope, ReasonCode, Reasons};
use crate::state::{self, NULL};

/// Knobs for one [`run`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunOptions {
    /// Execution budget, in milliseconds.
    pub budget_ms: f64,
    /// Defer the rest of the first pass once the budget is spent.
    pub time_slicing: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            budget_ms: 8.0,
            time_slicing: false,
        }
    }
}

/// A source whose key changed; the resource collaborator should load it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRequest {
    /// The source node.
    pub node: NodeId,
    /// Concrete snapshot path the result belongs at.
    pub path: FieldPath,
    /// Resource id.
    pub resource: String,
    /// Derived key.
    pub key: Value,
    /// Hash of `key`, as stored in the snapshot.
    pub key_hash: String,
}

/// Counters of one execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStats {
    /// Passes over the ordered scope.
    pub passes: usize,
    /// Node evaluations (list-scoped nodes count once per element).
    pub nodes_evaluated: usize,
    /// Values written.
    pub writes: usize,
    /// Evaluations whose result equaled the current value.
    pub suppressed: usize,
    /// Wall time, in milliseconds.
    pub duration_ms: f64,
}

/// Result of a successful [`run`].
#[derive(Clone, Debug)]
pub struct ConvergeOutcome {
    /// The converged state.
    pub state: Value,
    /// Concrete paths written by derived nodes.
    pub dirty: DirtySet,
    /// Sources whose key changed, in evaluation order.
    pub source_requests: Vec<SourceRequest>,
    /// Nodes left for a later tick (time slicing), sorted.
    pub deferred: Vec<NodeId>,
    /// Reasons attached by the executor.
    pub reasons: Reasons,
    /// Counters.
    pub stats: StepStats,
}

/// Snapshot written for a source without a key.
#[must_use]
pub fn idle_snapshot() -> Value {
    json!({ "status": "idle", "keyHash": null, "data": null, "error": null })
}

/// Hash of a source key, as stored in `keyHash`.
#[must_use]
pub fn key_hash(key: &Value) -> String {
    key.to_string()
}

/// Converges `state` under `plan`.
///
/// On error the input state is consumed; callers keep their own copy of the
/// committed state to roll back to.
pub fn run(
    graph: &DependencyGraph,
    state: Value,
    plan: &ConvergePlan,
    options: &RunOptions,
) -> Result<ConvergeOutcome, ConvergeError> {
    let mut exec = Execution {
        state,
        dirty: DirtySet::new(),
        requests: Vec::new(),
        stats: StepStats::default(),
    };

    let order = match &plan.scope {
        PlanScope::All => TopoOrder::new(graph.node_graph(), graph.node_ids()),
        PlanScope::Nodes(nodes) => TopoOrder::new(graph.node_graph(), nodes.iter().copied()),
    }
    .into_keys();
    let mut position = vec![usize::MAX; graph.node_count()];
    for (i, id) in order.iter().enumerate() {
        position[id.as_usize()] = i;
    }

    let start = Instant::now();
    let cap = graph.depth().max(1);
    let mut pending = DenseIdBitSet::with_capacity(graph.node_count());
    let mut next = DenseIdBitSet::with_capacity(graph.node_count());
    for id in &order {
        pending.add(id.index());
    }
    let mut deferred = Vec::new();
    let mut reasons = Reasons::new();

    'passes: while !pending.is_empty() {
        exec.stats.passes += 1;
        if exec.stats.passes > cap {
            return Err(ConvergeError::FixedPointExceeded {
                cap,
                pending: pending
                    .iter()
                    .map(|id| graph.node(NodeId::from_index(id)).label().to_owned())
                    .collect(),
            });
        }

        for (i, &id) in order.iter().enumerate() {
            if !pending.remove(id.index()) {
                continue;
            }
            if options.time_slicing
                && exec.stats.passes == 1
                && exec.stats.nodes_evaluated > 0
                && elapsed_ms(start) >= options.budget_ms
            {
                pending.add(id.index());
                pending.union_with(&next);
                deferred.extend(pending.iter().map(NodeId::from_index));
                reasons.push(ReasonCode::TimeSlicingImmediate);
                tracing::debug!(
                    evaluated = i,
                    deferred = deferred.len(),
                    "converge budget spent, deferring"
                );
                break 'passes;
            }

            let written = exec.evaluate(graph.node(id))?;
            for path in written {
                graph.for_each_reader(&path, |reader| {
                    let at = position[reader.as_usize()];
                    if at == usize::MAX || reader == id {
                        return;
                    }
                    if at > i {
                        pending.add(reader.index());
                    } else {
                        next.add(reader.index());
                    }
                });
                exec.dirty.mark(path);
            }
        }

        std::mem::swap(&mut pending, &mut next);
        next.clear();
    }

    exec.stats.duration_ms = elapsed_ms(start);
    Ok(ConvergeOutcome {
        state: exec.state,
        dirty: exec.dirty,
        source_requests: exec.requests,
        deferred,
        reasons,
        stats: exec.stats,
    })
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

struct Execution {
    state: Value,
    dirty: DirtySet,
    requests: Vec<SourceRequest>,
    stats: StepStats,
}

impl Execution {
    /// Evaluates `node` (once per element for list-scoped nodes) and returns
    /// the concrete paths it wrote.
    fn evaluate(&mut self, node: &Node) -> Result<SmallVec<[FieldPath; 1]>, ConvergeError> {
        let mut written = SmallVec::new();
        match node.scope() {
            None => written.extend(self.evaluate_at(node, None)?),
            Some(list) => {
                let len = state::get(&self.state, list)
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                for index in 0..len {
                    written.extend(self.evaluate_at(node, Some(index))?);
                }
            }
        }
        Ok(written)
    }

    fn evaluate_at(
        &mut self,
        node: &Node,
        index: Option<usize>,
    ) -> Result<Option<FieldPath>, ConvergeError> {
        let concrete = |path: &FieldPath| match index {
            Some(i) if path.item_depth() == 1 => path.at_index(i),
            _ => path.clone(),
        };
        let target = concrete(node.target());
        let deps: SmallVec<[FieldPath; 4]> = node.reads().iter().map(concrete).collect();
        self.stats.nodes_evaluated += 1;
        tracing::trace!(node = node.label(), index, "evaluate");

        match &node.eval {
            NodeEval::Computed { get, equals } => {
                let next = {
                    let values = self.values(&deps);
                    get(values.as_slice())
                }
                .map_err(|source| ConvergeError::Derive {
                    node: node.label().to_owned(),
                    source,
                })?;
                self.write_if_changed(node, target, next, equals.as_ref())
            }
            NodeEval::Link { transform } => {
                let next = {
                    let values = self.values(&deps);
                    let from = values.first().copied().unwrap_or(&NULL);
                    match transform {
                        Some(transform) => transform(from),
                        None => from.clone(),
                    }
                };
                self.write_if_changed(node, target, next, None)
            }
            NodeEval::Source { resource, key } => {
                let key = {
                    let values = self.values(&deps);
                    key(values.as_slice())
                };
                self.refresh_source(node, target, resource, key)
            }
        }
    }

    fn values<'s>(&'s self, deps: &[FieldPath]) -> SmallVec<[&'s Value; 4]> {
        deps.iter()
            .map(|dep| state::get(&self.state, dep).unwrap_or(&NULL))
            .collect()
    }

    fn write_if_changed(
        &mut self,
        node: &Node,
        target: FieldPath,
        next: Value,
        equals: Option<&EqualsFn>,
    ) -> Result<Option<FieldPath>, ConvergeError> {
        let current = state::get(&self.state, &target).unwrap_or(&NULL);
        let unchanged = match equals {
            Some(equals) => equals(current, &next),
            None => *current == next,
        };
        if unchanged {
            self.stats.suppressed += 1;
            return Ok(None);
        }
        state::set(&mut self.state, &target, next).map_err(|source| ConvergeError::Write {
            node: node.label().to_owned(),
            source,
        })?;
        self.stats.writes += 1;
        Ok(Some(target))
    }

    fn refresh_source(
        &mut self,
        node: &Node,
        target: FieldPath,
        resource: &str,
        key: Option<Value>,
    ) -> Result<Option<FieldPath>, ConvergeError> {
        let Some(key) = key else {
            return self.write_if_changed(node, target, idle_snapshot(), None);
        };
        let hash = key_hash(&key);
        let stored = state::get(&self.state, &target.child("keyHash")).and_then(Value::as_str);
        if stored == Some(hash.as_str()) {
            self.stats.suppressed += 1;
            return Ok(None);
        }
        let data = state::get(&self.state, &target.child("data"))
            .cloned()
            .unwrap_or(Value::Null);
        let snapshot = json!({ "status": "loading", "keyHash": hash, "data": data, "error": null });
        let written = self.write_if_changed(node, target.clone(), snapshot, None)?;
        self.requests.push(SourceRequest {
            node: node.id(),
            path: target,
            resource: resource.to_owned(),
            key,
            key_hash: hash,
        });
        Ok(written)
    }
}
