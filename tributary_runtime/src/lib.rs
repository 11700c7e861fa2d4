// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tributary Runtime: transactions, scheduling and lifecycle for module
//! instances whose derived fields are kept consistent by
//! `tributary_converge`.
//!
//! - **Modules** ([`ModuleDef`]): initial state, trait declarations,
//!   reducers per action type, and logic units that register lifecycle
//!   hooks and reactions. The dependency graph is compiled once per module
//!   and shared by its instances.
//! - **Transactions** ([`Runtime::dispatch`], [`Runtime::dispatch_batch`]):
//!   reducers write into a [`StateDraft`] that records every written path.
//!   Each dispatch is one transaction with a per-instance, strictly
//!   increasing `txn_seq`.
//! - **Job queue** ([`JobQueue`]): at most one pending commit per topic.
//!   Later commits fold into it, so a flush delivers only the latest state.
//! - **Tick scheduler** ([`TickScheduler`]): drains dirty topics in bounded
//!   rounds, isolating failures per topic and handing leftovers back to the
//!   [`HostScheduler`].
//! - **Lifecycle** ([`Lifecycle`]) and **tasks** ([`TaskRunner`]): init and
//!   destroy effects, error handlers, and policy-bound async work owned by
//!   each instance. Destroying an instance interrupts all of its tasks.
//! - **Evidence** ([`EvidenceEvent`]): structured `state:update` and
//!   `trace:converge` events, gated by a [`DiagnosticsLevel`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tributary_converge::{Computed, TraitSet};
//! use tributary_runtime::{
//!     Action, DiagnosticsLevel, EvidenceEvent, MemorySink, ModuleDef, Runtime, RuntimeConfig,
//! };
//!
//! let cart = ModuleDef::builder("cart", json!({ "price": 4, "qty": 1 }))
//!     .traits(TraitSet::new().computed(
//!         "total",
//!         Computed::new(["price", "qty"], |v| {
//!             json!(v[0].as_i64().unwrap_or(0) * v[1].as_i64().unwrap_or(0))
//!         }),
//!     ))
//!     .reducer("setQty", |draft, qty| draft.set("qty", qty.clone()))
//!     .build()
//!     .unwrap();
//!
//! let mut runtime = Runtime::new(RuntimeConfig {
//!     diagnostics: DiagnosticsLevel::Light,
//!     ..RuntimeConfig::default()
//! });
//! let sink = Arc::new(MemorySink::new());
//! runtime.set_evidence_sink(sink.clone());
//!
//! let topic = runtime.create_instance(&cart).unwrap();
//! runtime.dispatch(&topic, Action::new("setQty", json!(3))).unwrap();
//! runtime.flush();
//!
//! assert_eq!(runtime.state(&topic).unwrap()["total"], json!(12));
//! assert!(matches!(sink.events()[0], EvidenceEvent::StateUpdate { txn_seq: 1, .. }));
//! ```
//!
//! ## Driving the runtime
//!
//! [`Runtime`] is a single-owner driver. Either call [`Runtime::flush`]
//! (and [`Runtime::pump`] for commands sent through a [`RuntimeHandle`])
//! from your own loop, or hand it to a tokio task running
//! [`Runtime::run`].

mod config;
mod draft;
mod error;
mod evidence;
mod instance;
mod lifecycle;
mod module;
mod queue;
mod resource;
mod runtime;
mod scheduler;
mod tasks;
mod txn;

pub use config::{RuntimeConfig, SchedulerConfig, TaskConfig};
pub use draft::StateDraft;
pub use error::{ConfigError, DispatchError, DraftError, LifecycleError, RuntimeError};
pub use evidence::{
    DiagnosticsLevel, Evidence, EvidenceEvent, EvidenceSink, MemorySink, TracingSink,
};
pub use lifecycle::{Effect, ErrorHandler, InitProgress, Lifecycle, LifecycleStatus};
pub use module::{
    LogicFn, ModuleBuilder, ModuleDef, Reaction, ReactionContext, ReactionFn, Reducer,
    SetupContext,
};
pub use queue::{CommitMeta, InstanceId, JobQueue, ModuleId, PendingCommit, Topic};
pub use resource::{ResourceLoader, ResourceRegistry, error_snapshot, success_snapshot};
pub use runtime::{Runtime, RuntimeHandle};
pub use scheduler::{
    FlushReport, HostScheduler, ManualHost, SchedulerState, TickScheduler, TopicFailure,
};
pub use tasks::{TaskPolicy, TaskRunner, Triggered};
pub use txn::{Action, CommitMode, OriginKind, Priority, Transaction, TxnSequencer};
