// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The auto converge planner: full or dirty, and why.

use tributary_dirty::TraversalScratch;

use crate::cache::{CacheEffect, CacheKey, CachedPlan, PlanCache};
use crate::closure::reverse_closure_with;
use crate::config::{ConvergeConfig, ConvergeMode, ModuleOverride};
use crate::dirty::DirtySet;
use crate::graph::{DependencyGraph, NodeId};
use crate::plan::{ConvergePlan, ExecutedMode, ReasonCode, Reasons};

/// Everything one decision depends on.
#[derive(Clone, Copy, Debug)]
pub struct PlannerInput<'a> {
    /// Graph of the instance's module.
    pub graph: &'a DependencyGraph,
    /// Paths written by the transaction.
    pub dirty: &'a DirtySet,
    /// Current instance generation.
    pub generation: u64,
    /// The instance's plan cache, as it is before this decision.
    pub cache: &'a PlanCache,
    /// Tuning.
    pub config: &'a ConvergeConfig,
    /// Explicit override, if the instance has one.
    pub module_override: Option<&'a ModuleOverride>,
}

/// A plan plus the cache update it implies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// The plan to execute.
    pub plan: ConvergePlan,
    /// To be applied to the cache with [`PlanCache::apply`].
    pub effect: CacheEffect,
}

impl Decision {
    fn new(plan: ConvergePlan) -> Self {
        Self {
            plan,
            effect: CacheEffect::default(),
        }
    }

    /// Downgrades a dirty plan to full with `budget_cutoff`, resetting the
    /// cost estimate. Full plans are returned unchanged.
    #[must_use]
    pub fn cut_off(mut self) -> Self {
        if self.plan.executed_mode == ExecutedMode::Dirty {
            let mut reasons = self.plan.reasons.clone();
            reasons.push(ReasonCode::BudgetCutoff);
            self.plan = ConvergePlan::full(reasons);
            self.effect.reset_cost = true;
        }
        self
    }
}

/// Chooses how to converge one transaction.
///
/// Precedence, first match wins:
///
/// 1. A forced mode in the module override (`module_override`).
/// 2. The generation differs from the last decision's (`generation_bumped`,
///    cache invalidated).
/// 3. No decision was made before (`cold_start`).
/// 4. The dirty set is a sentinel (`unknown_write` / `dirty_all`).
/// 5. A cached plan for the same digest, dirty signature and generation
///    (`cache_hit`, replaying the cached reasons).
/// 6. The closure covers at least `near_full_ratio` of the nodes
///    (`near_full`), otherwise a dirty plan over the closure (`cache_miss`).
///    Either is cached.
///
/// Finally, a dirty plan whose estimated cost exceeds the budget becomes
/// full (`budget_cutoff`).
///
/// The function is pure: equal inputs give equal decisions.
#[must_use]
pub fn decide(input: &PlannerInput<'_>) -> Decision {
    let mut scratch = TraversalScratch::with_capacity(input.graph.node_count());
    decide_with(input, &mut scratch)
}

/// Like [`decide`], reusing `scratch` for the closure walk.
pub fn decide_with(input: &PlannerInput<'_>, scratch: &mut TraversalScratch<NodeId>) -> Decision {
    let decision = choose(input, scratch);
    tracing::debug!(
        mode = ?decision.plan.executed_mode,
        reasons = ?decision.plan.reasons.as_slice(),
        generation = input.generation,
        "converge plan"
    );
    decision
}

fn choose(input: &PlannerInput<'_>, scratch: &mut TraversalScratch<NodeId>) -> Decision {
    let PlannerInput {
        graph,
        dirty,
        generation,
        cache,
        config,
        module_override,
    } = *input;

    if let Some(mode) = module_override.and_then(ModuleOverride::forced_mode) {
        let plan = match (mode, dirty) {
            (ConvergeMode::Dirty, DirtySet::Paths(paths)) => ConvergePlan::dirty(
                reverse_closure_with(graph, paths, scratch),
                [ReasonCode::ModuleOverride],
            ),
            (ConvergeMode::Dirty, DirtySet::Unknown) => {
                ConvergePlan::full([ReasonCode::ModuleOverride, ReasonCode::UnknownWrite])
            }
            (ConvergeMode::Dirty, DirtySet::All) => {
                ConvergePlan::full([ReasonCode::ModuleOverride, ReasonCode::DirtyAll])
            }
            _ => ConvergePlan::full([ReasonCode::ModuleOverride]),
        };
        return Decision::new(plan);
    }

    if cache.generation().is_some_and(|previous| previous != generation) {
        let mut decision = Decision::new(ConvergePlan::full([ReasonCode::GenerationBumped]));
        decision.effect.invalidate = true;
        return decision;
    }
    if !cache.is_warm() {
        return Decision::new(ConvergePlan::full([ReasonCode::ColdStart]));
    }

    let paths = match dirty {
        DirtySet::Unknown => return Decision::new(ConvergePlan::full([ReasonCode::UnknownWrite])),
        DirtySet::All => return Decision::new(ConvergePlan::full([ReasonCode::DirtyAll])),
        DirtySet::Paths(paths) => paths,
    };
    let Some(signature) = dirty.signature() else {
        return Decision::new(ConvergePlan::full([ReasonCode::UnknownWrite]));
    };
    let key = CacheKey {
        graph_digest: graph.digest().clone(),
        signature,
        generation,
    };

    let decision = if let Some(hit) = cache.get(&key) {
        let mut reasons = hit.reasons.clone();
        reasons.push(ReasonCode::CacheHit);
        Decision::new(ConvergePlan {
            executed_mode: hit.mode,
            reasons,
            scope: hit.scope.clone(),
        })
    } else {
        let closure = reverse_closure_with(graph, paths, scratch);
        let total = graph.node_count();
        let ratio = if total == 0 {
            0.0
        } else {
            closure.len() as f64 / total as f64
        };
        let (cached, plan) = if ratio >= config.near_full_ratio {
            let plan = ConvergePlan::full([ReasonCode::NearFull]);
            (CachedPlan::of(&plan), plan)
        } else {
            let plan = ConvergePlan::dirty(closure, Reasons::new());
            let cached = CachedPlan::of(&plan);
            let mut plan = plan;
            plan.reasons.push(ReasonCode::CacheMiss);
            (cached, plan)
        };
        Decision {
            plan,
            effect: CacheEffect {
                insert: Some((key, cached)),
                ..CacheEffect::default()
            },
        }
    };

    let over_budget = decision.plan.executed_mode == ExecutedMode::Dirty
        && cache
            .cost()
            .estimate(decision.plan.scope.len(graph.node_count()))
            .is_some_and(|estimate| estimate > config.budget_ms);
    if over_budget {
        decision.cut_off()
    } else {
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{Computed, TraitSet};
    use crate::path::FieldPath;
    use crate::plan::PlanScope;
    use crate::state::StateSchema;
    use serde_json::{Map, Value, json};

    fn first(values: &[&Value]) -> Value {
        values[0].clone()
    }

    /// `n` independent computed fields `d{i}` reading `f{i}`.
    fn fan(n: usize) -> DependencyGraph {
        let mut state = Map::new();
        let mut traits = TraitSet::new();
        for i in 0..n {
            state.insert(format!("f{i}"), json!(i));
            traits = traits.computed(format!("d{i}"), Computed::new([format!("f{i}")], first));
        }
        DependencyGraph::build(&traits, &StateSchema::from_value(&Value::Object(state))).unwrap()
    }

    fn dirty(paths: &[&str]) -> DirtySet {
        paths.iter().map(|p| FieldPath::parse(p).unwrap()).collect()
    }

    fn warm(generation: u64) -> PlanCache {
        let mut cache = PlanCache::new(16);
        cache.apply(generation, CacheEffect::default());
        cache
    }

    fn input<'a>(
        graph: &'a DependencyGraph,
        dirty: &'a DirtySet,
        cache: &'a PlanCache,
        config: &'a ConvergeConfig,
    ) -> PlannerInput<'a> {
        PlannerInput {
            graph,
            dirty,
            generation: 0,
            cache,
            config,
            module_override: None,
        }
    }

    #[test]
    fn cold_start_is_full() {
        let graph = fan(3);
        let dirty = dirty(&["f0"]);
        let cache = PlanCache::new(16);
        let config = ConvergeConfig::default();
        let decision = decide(&input(&graph, &dirty, &cache, &config));
        assert_eq!(decision.plan.executed_mode, ExecutedMode::Full);
        assert_eq!(decision.plan.reasons.as_slice(), &[ReasonCode::ColdStart]);
    }

    #[test]
    fn sparse_write_on_warm_instance_is_dirty() {
        let graph = fan(50);
        let dirty = dirty(&["f7"]);
        let cache = warm(0);
        let config = ConvergeConfig::default();
        let decision = decide(&input(&graph, &dirty, &cache, &config));
        assert_eq!(decision.plan.executed_mode, ExecutedMode::Dirty);
        assert!(!decision.plan.reasons.contains(ReasonCode::ColdStart));
        assert!(decision.plan.reasons.contains(ReasonCode::CacheMiss));
        assert_eq!(decision.plan.scope.len(graph.node_count()), 1);
        assert!(decision.effect.insert.is_some());
    }

    #[test]
    fn sentinels_force_full() {
        let graph = fan(3);
        let cache = warm(0);
        let config = ConvergeConfig::default();
        let unknown = DirtySet::Unknown;
        let decision = decide(&input(&graph, &unknown, &cache, &config));
        assert_eq!(decision.plan.reasons.as_slice(), &[ReasonCode::UnknownWrite]);
        let all = DirtySet::All;
        let decision = decide(&input(&graph, &all, &cache, &config));
        assert_eq!(decision.plan.reasons.as_slice(), &[ReasonCode::DirtyAll]);
    }

    #[test]
    fn near_full_closure_is_full() {
        let graph = fan(10);
        let dirty = dirty(&["f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8"]);
        let cache = warm(0);
        let config = ConvergeConfig::default();
        let decision = decide(&input(&graph, &dirty, &cache, &config));
        assert_eq!(decision.plan.executed_mode, ExecutedMode::Full);
        assert_eq!(decision.plan.reasons.as_slice(), &[ReasonCode::NearFull]);
    }

    #[test]
    fn second_decision_hits_the_cache() {
        let graph = fan(10);
        let config = ConvergeConfig::default();
        let mut cache = warm(0);

        let first_dirty = dirty(&["f3"]);
        let miss = decide(&input(&graph, &first_dirty, &cache, &config));
        cache.apply(0, miss.effect);

        let again = dirty(&["f3"]);
        let hit = decide(&input(&graph, &again, &cache, &config));
        assert_eq!(hit.plan.executed_mode, ExecutedMode::Dirty);
        assert_eq!(hit.plan.reasons.as_slice(), &[ReasonCode::CacheHit]);
        assert_eq!(hit.plan.scope, miss.plan.scope);
        assert_eq!(hit.effect, CacheEffect::default());
    }

    #[test]
    fn decisions_are_repeatable() {
        let graph = fan(10);
        let dirty = dirty(&["f1", "f2"]);
        let cache = warm(0);
        let config = ConvergeConfig::default();
        let a = decide(&input(&graph, &dirty, &cache, &config));
        let b = decide(&input(&graph, &dirty, &cache, &config));
        assert_eq!(a, b);
    }

    #[test]
    fn generation_bump_invalidates() {
        let graph = fan(3);
        let dirty = dirty(&["f0"]);
        let cache = warm(0);
        let config = ConvergeConfig::default();
        let mut bumped = input(&graph, &dirty, &cache, &config);
        bumped.generation = 1;
        let decision = decide(&bumped);
        assert_eq!(decision.plan.reasons.as_slice(), &[ReasonCode::GenerationBumped]);
        assert!(decision.effect.invalidate);
    }

    #[test]
    fn override_short_circuits() {
        let graph = fan(3);
        let dirty = dirty(&["f0"]);
        let cache = PlanCache::new(16);
        let config = ConvergeConfig::default();

        let full = ModuleOverride {
            converge_mode: Some(ConvergeMode::Full),
            ..ModuleOverride::default()
        };
        let mut forced = input(&graph, &dirty, &cache, &config);
        forced.module_override = Some(&full);
        let decision = decide(&forced);
        assert_eq!(decision.plan.executed_mode, ExecutedMode::Full);
        assert_eq!(decision.plan.reasons.as_slice(), &[ReasonCode::ModuleOverride]);

        let dirty_mode = ModuleOverride {
            converge_mode: Some(ConvergeMode::Dirty),
            ..ModuleOverride::default()
        };
        forced.module_override = Some(&dirty_mode);
        let decision = decide(&forced);
        assert_eq!(decision.plan.executed_mode, ExecutedMode::Dirty);
        assert!(!decision.plan.reasons.contains(ReasonCode::ColdStart));
        assert!(matches!(&decision.plan.scope, PlanScope::Nodes(nodes) if nodes.len() == 1));
    }

    #[test]
    fn over_budget_dirty_plan_is_cut_off() {
        let graph = fan(10);
        let dirty = dirty(&["f0", "f1"]);
        let mut cache = warm(0);
        cache.record_execution(1, 5.0);
        let config = ConvergeConfig {
            budget_ms: 8.0,
            ..ConvergeConfig::default()
        };
        let decision = decide(&input(&graph, &dirty, &cache, &config));
        assert_eq!(decision.plan.executed_mode, ExecutedMode::Full);
        assert_eq!(
            decision.plan.reasons.as_slice(),
            &[ReasonCode::CacheMiss, ReasonCode::BudgetCutoff]
        );
        assert!(decision.effect.reset_cost);
    }
}
