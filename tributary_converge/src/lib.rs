// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tributary Converge: keep derived fields of a state tree consistent.
//!
//! A module declares some of its state fields as *derived* through a
//! [`TraitSet`]: computed from other fields, linked to another field, or
//! backed by an external resource. This crate compiles those declarations
//! into a [`DependencyGraph`], decides per transaction how much of the graph
//! to re-evaluate, and evaluates it.
//!
//! The pipeline for one transaction:
//!
//! 1. The transaction records the paths it wrote in a [`DirtySet`].
//! 2. [`decide`] picks a [`ConvergePlan`]: `full` (every node) or `dirty`
//!    (only the [`reverse_closure`] of the written paths), with
//!    machine-readable [`ReasonCode`]s. The decision consults and updates a
//!    per-instance [`PlanCache`] keyed by the graph's [`StaticDigest`], the
//!    dirty set's [`DirtySignature`] and the instance generation.
//! 3. [`executor::run`] evaluates the plan's scope in dependency order,
//!    suppressing no-op writes and iterating (bounded by the graph depth)
//!    until writes stop producing further dirt.
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use tributary_converge::{
//!     Computed, ConvergeConfig, DependencyGraph, DirtySet, ExecutedMode, PlanCache,
//!     PlannerInput, RunOptions, StateSchema, TraitSet, decide, executor,
//! };
//!
//! let state = json!({ "price": 3, "qty": 2 });
//! let traits = TraitSet::new().computed(
//!     "total",
//!     Computed::new(["price", "qty"], |v| {
//!         json!(v[0].as_i64().unwrap_or(0) * v[1].as_i64().unwrap_or(0))
//!     }),
//! );
//! let graph = DependencyGraph::build(&traits, &StateSchema::from_value(&state)).unwrap();
//!
//! let config = ConvergeConfig::default();
//! let mut cache = PlanCache::new(config.plan_cache_capacity);
//! let dirty: DirtySet = ["qty".parse().unwrap()].into_iter().collect();
//!
//! let decision = decide(&PlannerInput {
//!     graph: &graph,
//!     dirty: &dirty,
//!     generation: 0,
//!     cache: &cache,
//!     config: &config,
//!     module_override: None,
//! });
//! // A fresh instance always starts with a full pass.
//! assert_eq!(decision.plan.executed_mode, ExecutedMode::Full);
//! cache.apply(0, decision.effect);
//!
//! let outcome = executor::run(&graph, state, &decision.plan, &RunOptions::default()).unwrap();
//! assert_eq!(outcome.state["total"], json!(6));
//! ```
//!
//! ## Paths and lists
//!
//! [`FieldPath`]s are dotted strings. `items.2.price` addresses one list
//! element; `items[].price` is the item shape of the list. A node whose
//! target contains `[]` is evaluated once per element, with its item-level
//! dependencies resolved against the same element. Only one list level is
//! supported.
//!
//! ## Cycles
//!
//! Cyclic declarations are accepted. The closure walk terminates, and the
//! executor stops with [`ConvergeError::FixedPointExceeded`] when the
//! iteration cap is reached.

mod cache;
mod closure;
mod config;
mod decl;
mod dirty;
mod error;
pub mod executor;
mod graph;
mod path;
mod plan;
mod planner;
pub mod state;

pub use cache::{CacheEffect, CacheKey, CachedPlan, CostModel, PlanCache};
pub use closure::{reverse_closure, reverse_closure_with};
pub use config::{ConvergeConfig, ConvergeMode, ModuleOverride};
pub use decl::{
    Computed, DeriveError, DeriveFn, EqualsFn, KeyFn, Link, Source, TraitDecl, TraitSet,
    TransformFn,
};
pub use dirty::{DirtySet, DirtySignature};
pub use error::{BuildError, ConvergeError};
pub use executor::{ConvergeOutcome, RunOptions, SourceRequest, StepStats};
pub use graph::{DependencyGraph, Node, NodeId, NodeKind, SNAPSHOT_FIELDS, StaticDigest};
pub use path::{FieldPath, PathParseError, Segment};
pub use plan::{ConvergePlan, ExecutedMode, PlanScope, ReasonCode, Reasons};
pub use planner::{Decision, PlannerInput, decide, decide_with};
pub use state::{StateSchema, WriteError};

pub use tributary_dirty::TraversalScratch;
