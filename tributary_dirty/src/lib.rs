// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tributary Dirty: dense-id primitives for dirty tracking.
//!
//! This crate holds the storage-level building blocks that the convergence
//! engine in `tributary_converge` is built on. Everything here is keyed by
//! small dense integers so that per-transaction work is proportional to the
//! number of touched ids, not to the size of the state tree.
//!
//! - **Bit set** ([`DenseIdBitSet`]): compact membership for dirty field or
//!   node ids, with amortized "touched words" clearing.
//! - **Dependency graph** ([`DenseGraph`]): bidirectional "A depends on B"
//!   adjacency with optional cycle checks and a depth measure.
//! - **Topological order** ([`TopoOrder`]): deterministic Kahn ordering of a
//!   key subset; cycle members are reported, not dropped.
//! - **Scratch buffers** ([`TraversalScratch`]): reusable traversal state for
//!   transitive-dependent walks.
//! - **Interning** ([`intern::Interner`]): owned keys to dense ids.
//!
//! ## Quick Start
//!
//! ```rust
//! use tributary_dirty::{CycleHandling, DenseGraph, TopoOrder, TraversalScratch};
//!
//! let mut graph = DenseGraph::<u32>::new();
//! // 2 depends on 1, 3 depends on 2
//! graph.add_dependency(2, 1, CycleHandling::Allow).unwrap();
//! graph.add_dependency(3, 2, CycleHandling::Allow).unwrap();
//!
//! // Everything affected by a change to 1
//! let mut scratch = TraversalScratch::new();
//! let mut affected = Vec::new();
//! graph.for_each_affected([1], &mut scratch, |k| affected.push(k));
//!
//! // Evaluate in dependency order
//! let order = TopoOrder::new(&graph, affected);
//! assert_eq!(order.keys(), &[1, 2, 3]);
//! ```
//!
//! ## Cycles
//!
//! [`DenseGraph::add_dependency`] takes a [`CycleHandling`]. Derived-state
//! graphs use [`CycleHandling::Allow`]: traversals track visited keys and
//! [`TopoOrder`] reports stalled cycle members, so consumers can bound their
//! own fixed-point iteration.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod bitset;
mod graph;
pub mod intern;
mod scratch;
mod topo;

pub use bitset::DenseIdBitSet;
pub use graph::{CycleError, CycleHandling, DenseGraph, DenseKey};
pub use intern::InternId;
pub use scratch::TraversalScratch;
pub use topo::{OrderCompletion, TopoOrder};
