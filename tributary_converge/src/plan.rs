// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Convergence plans and the reasons behind them.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use smallvec::SmallVec;

use crate::graph::NodeId;

/// Why a plan was chosen.
///
/// Declaration order is the reporting order; see [`Reasons`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// A module override forced the mode.
    ModuleOverride,
    /// The instance's trait set changed since the last plan.
    GenerationBumped,
    /// First plan of the instance.
    ColdStart,
    /// The dirty set is an opaque bulk write.
    UnknownWrite,
    /// The dirty set asks for everything.
    DirtyAll,
    /// The closure covers most of the graph.
    NearFull,
    /// Replayed from the plan cache.
    CacheHit,
    /// Computed fresh and cached.
    CacheMiss,
    /// The dirty scope was estimated to exceed the budget.
    BudgetCutoff,
    /// The executor ran out of budget and deferred the rest.
    TimeSlicingImmediate,
    /// Deferred work scheduled on a later tick.
    TimeSlicingDeferred,
}

impl ReasonCode {
    /// Stable wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModuleOverride => "module_override",
            Self::GenerationBumped => "generation_bumped",
            Self::ColdStart => "cold_start",
            Self::UnknownWrite => "unknown_write",
            Self::DirtyAll => "dirty_all",
            Self::NearFull => "near_full",
            Self::CacheHit => "cache_hit",
            Self::CacheMiss => "cache_miss",
            Self::BudgetCutoff => "budget_cutoff",
            Self::TimeSlicingImmediate => "time_slicing_immediate",
            Self::TimeSlicingDeferred => "time_slicing_deferred",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free reason list.
///
/// Reasons attached by different stages (planner, executor, scheduler) end
/// up in one list sorted by [`ReasonCode`] order, so evidence compares
/// equal regardless of which stage attached what first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Reasons(SmallVec<[ReasonCode; 4]>);

impl Reasons {
    /// No reasons.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `reason` at its ordered position, unless already present.
    pub fn push(&mut self, reason: ReasonCode) {
        if let Err(at) = self.0.binary_search(&reason) {
            self.0.insert(at, reason);
        }
    }

    /// Adds every reason of `other`.
    pub fn extend(&mut self, other: &Self) {
        for &reason in &other.0 {
            self.push(reason);
        }
    }

    /// Returns `true` if `reason` is present.
    #[must_use]
    pub fn contains(&self, reason: ReasonCode) -> bool {
        self.0.binary_search(&reason).is_ok()
    }

    /// The reasons, in order.
    #[must_use]
    pub fn as_slice(&self) -> &[ReasonCode] {
        &self.0
    }
}

impl<const N: usize> From<[ReasonCode; N]> for Reasons {
    fn from(reasons: [ReasonCode; N]) -> Self {
        let mut out = Self::new();
        for reason in reasons {
            out.push(reason);
        }
        out
    }
}

/// Execution mode of a plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutedMode {
    /// Every node.
    Full,
    /// Only the affected closure.
    Dirty,
}

/// Nodes a plan evaluates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanScope {
    /// Every node of the graph.
    All,
    /// These nodes, sorted.
    Nodes(Arc<[NodeId]>),
}

impl PlanScope {
    /// Number of nodes in scope, given the graph size.
    #[must_use]
    pub fn len(&self, total: usize) -> usize {
        match self {
            Self::All => total,
            Self::Nodes(nodes) => nodes.len(),
        }
    }
}

/// Outcome of one planner decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvergePlan {
    /// Chosen mode.
    pub executed_mode: ExecutedMode,
    /// Why.
    pub reasons: Reasons,
    /// What to evaluate.
    pub scope: PlanScope,
}

impl ConvergePlan {
    /// A full plan with `reasons`.
    #[must_use]
    pub fn full(reasons: impl Into<Reasons>) -> Self {
        Self {
            executed_mode: ExecutedMode::Full,
            reasons: reasons.into(),
            scope: PlanScope::All,
        }
    }

    /// A dirty plan over `nodes`.
    #[must_use]
    pub fn dirty(nodes: impl Into<Arc<[NodeId]>>, reasons: impl Into<Reasons>) -> Self {
        Self {
            executed_mode: ExecutedMode::Dirty,
            reasons: reasons.into(),
            scope: PlanScope::Nodes(nodes.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_ordered_and_unique() {
        let mut reasons = Reasons::new();
        reasons.push(ReasonCode::TimeSlicingImmediate);
        reasons.push(ReasonCode::CacheHit);
        reasons.push(ReasonCode::ModuleOverride);
        reasons.push(ReasonCode::CacheHit);
        assert_eq!(
            reasons.as_slice(),
            &[
                ReasonCode::ModuleOverride,
                ReasonCode::CacheHit,
                ReasonCode::TimeSlicingImmediate
            ]
        );
        assert!(reasons.contains(ReasonCode::CacheHit));
        assert!(!reasons.contains(ReasonCode::ColdStart));
    }

    #[test]
    fn wire_strings() {
        let reasons = Reasons::from([ReasonCode::NearFull, ReasonCode::ColdStart]);
        assert_eq!(
            serde_json::to_string(&reasons).unwrap(),
            r#"["cold_start","near_full"]"#
        );
        assert_eq!(ReasonCode::BudgetCutoff.to_string(), "budget_cutoff");
        assert_eq!(
            serde_json::to_string(&ExecutedMode::Dirty).unwrap(),
            r#""dirty""#
        );
    }
}
