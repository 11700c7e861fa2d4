// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-instance plan cache and execution cost model.

use std::collections::{HashMap, VecDeque};

use crate::dirty::DirtySignature;
use crate::graph::StaticDigest;
use crate::plan::{ConvergePlan, ExecutedMode, PlanScope, Reasons};

/// Smoothing factor of the per-node cost average.
const COST_ALPHA: f64 = 0.3;

/// Key of a cached plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Structure of the graph the plan was made for.
    pub graph_digest: StaticDigest,
    /// Shape of the dirty set.
    pub signature: DirtySignature,
    /// Instance generation at decision time.
    pub generation: u64,
}

/// A remembered decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedPlan {
    /// Mode chosen.
    pub mode: ExecutedMode,
    /// Scope chosen.
    pub scope: PlanScope,
    /// Reasons at decision time, replayed next to `cache_hit`.
    pub reasons: Reasons,
}

impl CachedPlan {
    /// Snapshot of `plan`.
    #[must_use]
    pub fn of(plan: &ConvergePlan) -> Self {
        Self {
            mode: plan.executed_mode,
            scope: plan.scope.clone(),
            reasons: plan.reasons.clone(),
        }
    }
}

/// Changes a planner decision asks its caller to make to the cache.
///
/// Decisions are pure; the instance applies the effect afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheEffect {
    /// Drop every entry.
    pub invalidate: bool,
    /// Remember this plan.
    pub insert: Option<(CacheKey, CachedPlan)>,
    /// Forget the cost estimate.
    pub reset_cost: bool,
}

/// Exponentially weighted average cost of evaluating one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostModel {
    avg_node_ms: Option<f64>,
}

impl CostModel {
    /// Feeds back one execution.
    pub fn record(&mut self, nodes_evaluated: usize, duration_ms: f64) {
        if nodes_evaluated == 0 {
            return;
        }
        let sample = duration_ms / nodes_evaluated as f64;
        self.avg_node_ms = Some(match self.avg_node_ms {
            Some(avg) => avg + COST_ALPHA * (sample - avg),
            None => sample,
        });
    }

    /// Estimated cost of evaluating `nodes` nodes; `None` until measured.
    #[must_use]
    pub fn estimate(&self, nodes: usize) -> Option<f64> {
        self.avg_node_ms.map(|avg| avg * nodes as f64)
    }

    /// Forgets every sample.
    pub fn reset(&mut self) {
        self.avg_node_ms = None;
    }
}

/// Bounded cache of plans for one instance; the oldest insertion is evicted
/// first.
///
/// Also remembers the generation of the last applied decision (used to
/// detect generation bumps) and whether the instance has planned at all.
#[derive(Clone, Debug)]
pub struct PlanCache {
    generation: Option<u64>,
    entries: HashMap<CacheKey, CachedPlan>,
    order: VecDeque<CacheKey>,
    capacity: usize,
    cost: CostModel,
}

impl PlanCache {
    /// Creates an empty, cold cache holding up to `capacity` plans.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            generation: None,
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            cost: CostModel::default(),
        }
    }

    /// `true` once any decision has been applied.
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.generation.is_some()
    }

    /// Generation of the last applied decision.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Cached plan for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&CachedPlan> {
        self.entries.get(key)
    }

    /// Number of cached plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no plan is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cost model.
    #[must_use]
    pub fn cost(&self) -> &CostModel {
        &self.cost
    }

    /// Feeds back one execution into the cost model.
    pub fn record_execution(&mut self, nodes_evaluated: usize, duration_ms: f64) {
        self.cost.record(nodes_evaluated, duration_ms);
    }

    /// Applies the effect of a decision made at `generation`.
    pub fn apply(&mut self, generation: u64, effect: CacheEffect) {
        if effect.invalidate {
            self.entries.clear();
            self.order.clear();
        }
        if effect.reset_cost {
            self.cost.reset();
        }
        if let Some((key, plan)) = effect.insert {
            self.insert(key, plan);
        }
        self.generation = Some(generation);
    }

    fn insert(&mut self, key: CacheKey, plan: CachedPlan) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), plan).is_some() {
            self.order.retain(|k| *k != key);
        } else {
            while self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.order.push_back(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::DirtySet;
    use crate::path::FieldPath;
    use crate::plan::ReasonCode;

    fn key(path: &str, generation: u64) -> CacheKey {
        let dirty: DirtySet = [FieldPath::parse(path).unwrap()].into_iter().collect();
        CacheKey {
            graph_digest: digest(),
            signature: dirty.signature().unwrap(),
            generation,
        }
    }

    fn digest() -> StaticDigest {
        use crate::{DependencyGraph, StateSchema, TraitSet};
        DependencyGraph::build(&TraitSet::new(), &StateSchema::new())
            .unwrap()
            .digest()
            .clone()
    }

    fn plan() -> CachedPlan {
        CachedPlan::of(&ConvergePlan::full([ReasonCode::NearFull]))
    }

    #[test]
    fn apply_warms_and_inserts() {
        let mut cache = PlanCache::new(4);
        assert!(!cache.is_warm());
        cache.apply(
            1,
            CacheEffect {
                insert: Some((key("a", 1), plan())),
                ..CacheEffect::default()
            },
        );
        assert!(cache.is_warm());
        assert_eq!(cache.generation(), Some(1));
        assert_eq!(cache.get(&key("a", 1)), Some(&plan()));
        assert_eq!(cache.get(&key("a", 2)), None);
    }

    #[test]
    fn evicts_oldest_insertion() {
        let mut cache = PlanCache::new(2);
        for path in ["a", "b", "c"] {
            cache.apply(
                0,
                CacheEffect {
                    insert: Some((key(path, 0), plan())),
                    ..CacheEffect::default()
                },
            );
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a", 0)).is_none());
        assert!(cache.get(&key("c", 0)).is_some());
    }

    #[test]
    fn invalidate_clears_entries() {
        let mut cache = PlanCache::new(2);
        cache.apply(
            0,
            CacheEffect {
                insert: Some((key("a", 0), plan())),
                ..CacheEffect::default()
            },
        );
        cache.apply(
            1,
            CacheEffect {
                invalidate: true,
                ..CacheEffect::default()
            },
        );
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), Some(1));
    }

    #[test]
    fn cost_model_smooths_and_resets() {
        let mut cost = CostModel::default();
        assert_eq!(cost.estimate(10), None);
        cost.record(10, 10.0);
        assert_eq!(cost.estimate(10), Some(10.0));
        cost.record(10, 20.0);
        let estimate = cost.estimate(1).unwrap();
        assert!((estimate - 1.3).abs() < 1e-9, "estimate was {estimate}");
        cost.record(0, 100.0);
        assert!((cost.estimate(1).unwrap() - 1.3).abs() < 1e-9, "empty runs are ignored");
        cost.reset();
        assert_eq!(cost.estimate(1), None);
    }
}
