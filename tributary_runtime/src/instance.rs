// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One module instance: committed state and its instance-private caches.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tributary_converge::{
    ConvergeConfig, ConvergeError, ConvergePlan, DependencyGraph, DirtySet, ExecutedMode,
    ModuleOverride, NodeId, PlanCache, PlanScope, PlannerInput, ReasonCode, Reasons, RunOptions,
    SourceRequest, StateSchema, StepStats, TraitSet, TraversalScratch, decide_with, executor,
};

use crate::error::RuntimeError;
use crate::lifecycle::Lifecycle;
use crate::module::{ModuleDef, Reaction, SetupContext};
use crate::queue::Topic;
use crate::tasks::TaskRunner;
use crate::txn::{CommitMode, OriginKind, Priority, Transaction, TxnSequencer};

/// Result of converging and committing one pending commit.
#[derive(Debug)]
pub(crate) struct Committed {
    pub(crate) previous: Value,
    pub(crate) executed_mode: ExecutedMode,
    pub(crate) reasons: Reasons,
    pub(crate) stats: StepStats,
    pub(crate) budget_ms: f64,
    pub(crate) written: DirtySet,
    pub(crate) source_requests: Vec<SourceRequest>,
    pub(crate) deferred: bool,
}

/// State, graph and caches of one instance.
///
/// Plan cache, traversal scratch and generation belong to the instance
/// alone and are dropped with it.
#[derive(Debug)]
pub(crate) struct ModuleInstance {
    topic: Topic,
    def: Arc<ModuleDef>,
    state: Value,
    traits: TraitSet,
    graph: Arc<DependencyGraph>,
    generation: u64,
    cache: PlanCache,
    scratch: TraversalScratch<NodeId>,
    seq: TxnSequencer,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) tasks: TaskRunner,
    reactions: Vec<Reaction>,
    module_override: Option<ModuleOverride>,
    deferred: Vec<NodeId>,
}

impl ModuleInstance {
    /// A fresh instance of `def`. Runs the logic units but nothing else.
    pub(crate) fn new(
        topic: Topic,
        def: Arc<ModuleDef>,
        config: &ConvergeConfig,
        parallel_cap: usize,
    ) -> Self {
        let graph = def.graph().clone();
        let mut instance = Self {
            state: def.initial_state().clone(),
            traits: def.traits().clone(),
            scratch: TraversalScratch::with_capacity(graph.node_count()),
            graph,
            generation: 0,
            cache: PlanCache::new(config.plan_cache_capacity),
            seq: TxnSequencer::new(),
            lifecycle: Lifecycle::new(),
            tasks: TaskRunner::new(parallel_cap),
            reactions: Vec::new(),
            module_override: def.module_override().cloned(),
            deferred: Vec::new(),
            topic,
            def,
        };
        let def = instance.def.clone();
        for (name, setup) in def.logic() {
            tracing::trace!(topic = %instance.topic, logic = %name, "setting up logic unit");
            setup(&mut SetupContext::new(
                &instance.topic,
                &mut instance.lifecycle,
                &mut instance.reactions,
            ));
        }
        instance
    }

    pub(crate) fn topic(&self) -> &Topic {
        &self.topic
    }

    pub(crate) fn def(&self) -> &Arc<ModuleDef> {
        &self.def
    }

    pub(crate) fn state(&self) -> &Value {
        &self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub(crate) fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub(crate) fn set_module_override(&mut self, module_override: Option<ModuleOverride>) {
        self.module_override = module_override;
    }

    /// Derives every field of the initial state with one full pass.
    ///
    /// The planner is not consulted, so the first transaction still starts
    /// cold.
    pub(crate) fn initialize(
        &mut self,
        config: &ConvergeConfig,
    ) -> Result<Vec<SourceRequest>, ConvergeError> {
        let options = RunOptions {
            budget_ms: config.budget_ms,
            time_slicing: false,
        };
        let outcome = executor::run(
            &self.graph,
            self.state.clone(),
            &ConvergePlan::full(Reasons::new()),
            &options,
        )?;
        self.state = outcome.state;
        Ok(outcome.source_requests)
    }

    /// Consumes the next sequence number for a transaction.
    pub(crate) fn begin(
        &mut self,
        commit_mode: CommitMode,
        priority: Priority,
        origin_kind: OriginKind,
        origin_name: impl Into<String>,
    ) -> Transaction {
        let txn_seq = self.seq.next_seq();
        Transaction {
            txn_id: format!("{}::t{txn_seq}", self.topic),
            txn_seq,
            commit_mode,
            priority,
            origin_kind,
            origin_name: origin_name.into(),
        }
    }

    /// Replaces the instance's traits, bumping the generation.
    ///
    /// The schema is the module's initial schema plus whatever the committed
    /// state holds now.
    pub(crate) fn replace_traits(&mut self, traits: TraitSet) -> Result<u64, RuntimeError> {
        let mut schema = self.def.schema().clone();
        for path in StateSchema::from_value(&self.state).iter() {
            schema.insert(path);
        }
        let graph = DependencyGraph::build(&traits, &schema).map_err(|source| {
            RuntimeError::Build {
                module: self.def.id().to_string(),
                source,
            }
        })?;
        self.scratch = TraversalScratch::with_capacity(graph.node_count());
        self.graph = Arc::new(graph);
        self.traits = traits;
        self.deferred.clear();
        self.generation += 1;
        tracing::debug!(
            topic = %self.topic,
            generation = self.generation,
            digest = %self.graph.digest(),
            "traits changed"
        );
        Ok(self.generation)
    }

    pub(crate) fn traits(&self) -> &TraitSet {
        &self.traits
    }

    /// Plans and runs convergence of `state`, committing on success.
    ///
    /// On failure the committed state is untouched.
    pub(crate) fn converge(
        &mut self,
        state: Value,
        dirty: &DirtySet,
        config: &ConvergeConfig,
    ) -> Result<Committed, ConvergeError> {
        let config = match &self.module_override {
            Some(over) => config.with_override(over),
            None => config.clone(),
        };

        let started = Instant::now();
        let input = PlannerInput {
            graph: &self.graph,
            dirty,
            generation: self.generation,
            cache: &self.cache,
            config: &config,
            module_override: self.module_override.as_ref(),
        };
        let mut decision = decide_with(&input, &mut self.scratch);
        if let Some(budget_ms) = config.decision_budget_ms {
            let decision_ms = started.elapsed().as_secs_f64() * 1000.0;
            if decision_ms > budget_ms {
                tracing::debug!(
                    topic = %self.topic,
                    decision_ms,
                    budget_ms,
                    "decision over budget"
                );
                decision = decision.cut_off();
            }
        }
        self.cache.apply(self.generation, decision.effect);

        let plan = self.with_deferred(decision.plan);
        let options = RunOptions {
            budget_ms: config.budget_ms,
            time_slicing: config.time_slicing,
        };
        let outcome = executor::run(&self.graph, state, &plan, &options)?;

        self.cache
            .record_execution(outcome.stats.nodes_evaluated, outcome.stats.duration_ms);
        self.deferred = outcome.deferred;
        let previous = std::mem::replace(&mut self.state, outcome.state);

        let mut reasons = plan.reasons;
        reasons.extend(&outcome.reasons);
        Ok(Committed {
            previous,
            executed_mode: plan.executed_mode,
            reasons,
            stats: outcome.stats,
            budget_ms: config.budget_ms,
            written: outcome.dirty,
            source_requests: outcome.source_requests,
            deferred: !self.deferred.is_empty(),
        })
    }

    /// Folds nodes deferred by the previous time slice into a dirty plan.
    fn with_deferred(&self, plan: ConvergePlan) -> ConvergePlan {
        if self.deferred.is_empty() {
            return plan;
        }
        match &plan.scope {
            PlanScope::All => plan,
            PlanScope::Nodes(nodes) => {
                let mut merged: Vec<NodeId> = nodes.iter().chain(&self.deferred).copied().collect();
                merged.sort_unstable();
                merged.dedup();
                let mut reasons = plan.reasons.clone();
                reasons.push(ReasonCode::TimeSlicingDeferred);
                ConvergePlan::dirty(merged, reasons)
            }
        }
    }
}
