// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured evidence events for external consumers.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tributary_converge::{ExecutedMode, Reasons, StepStats};

use crate::txn::{CommitMode, OriginKind, Priority};

/// How much evidence to emit.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsLevel {
    /// Nothing. Events are never constructed.
    #[default]
    Off,
    /// Per-commit events.
    Light,
    /// Per-commit events with detail, plus scheduler rounds.
    Full,
}

/// One evidence event. Serializes with a `type` tag and camelCase fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EvidenceEvent {
    /// A transaction was committed.
    #[serde(rename = "state:update")]
    StateUpdate {
        /// Instance.
        topic: String,
        /// Transaction id of the earliest folded transaction.
        txn_id: String,
        /// Earliest folded sequence number.
        txn_seq: u64,
        /// Single or batched.
        commit_mode: CommitMode,
        /// Priority the commit was drained with.
        priority: Priority,
        /// Origin category.
        origin_kind: OriginKind,
        /// Origin name.
        origin_name: String,
        /// Transactions folded into this commit.
        coalesced_count: usize,
    },
    /// How a commit was converged.
    #[serde(rename = "trace:converge")]
    ConvergeTrace {
        /// Instance.
        topic: String,
        /// Earliest folded sequence number.
        txn_seq: u64,
        /// Full or dirty.
        executed_mode: ExecutedMode,
        /// Planner and executor reasons.
        reasons: Reasons,
        /// Graph digest.
        static_ir_digest: String,
        /// Budget in force.
        execution_budget_ms: f64,
        /// Measured wall time.
        execution_duration_ms: f64,
        /// Executor counters.
        step_stats: StepStats,
        /// Written derived paths; only at [`DiagnosticsLevel::Full`].
        #[serde(skip_serializing_if = "Option::is_none")]
        dirty_paths: Option<Vec<String>>,
    },
    /// A topic failed and was isolated.
    #[serde(rename = "topic:error")]
    TopicError {
        /// Instance.
        topic: String,
        /// Rolled back sequence number.
        txn_seq: u64,
        /// Error message.
        message: String,
    },
    /// One drain round finished.
    #[serde(rename = "scheduler:round")]
    SchedulerRound {
        /// Round number within the flush, from 1.
        round: usize,
        /// Topics processed in the round.
        topics: usize,
        /// Dirty topics left after the round.
        remaining: usize,
    },
}

/// Receives evidence events.
pub trait EvidenceSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: EvidenceEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EvidenceEvent>>,
}

impl MemorySink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the events so far.
    #[must_use]
    pub fn events(&self) -> Vec<EvidenceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes the events so far.
    pub fn take(&self) -> Vec<EvidenceEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EvidenceSink for MemorySink {
    fn emit(&self, event: EvidenceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Logs each event as JSON through `tracing` (target `tributary::evidence`).
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EvidenceSink for TracingSink {
    fn emit(&self, event: EvidenceEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "tributary::evidence", event = %json),
            Err(err) => tracing::warn!(target: "tributary::evidence", error = %err, "unserializable evidence"),
        }
    }
}

/// A sink gated by a diagnostics level.
#[derive(Clone)]
pub struct Evidence {
    level: DiagnosticsLevel,
    sink: Arc<dyn EvidenceSink>,
}

impl fmt::Debug for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evidence")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl Evidence {
    /// Gates `sink` at `level`.
    pub fn new(level: DiagnosticsLevel, sink: Arc<dyn EvidenceSink>) -> Self {
        Self { level, sink }
    }

    /// Active level.
    #[must_use]
    pub fn level(&self) -> DiagnosticsLevel {
        self.level
    }

    /// Returns `true` if events needing `min` are emitted.
    #[inline]
    #[must_use]
    pub fn enabled(&self, min: DiagnosticsLevel) -> bool {
        self.level != DiagnosticsLevel::Off && self.level >= min
    }

    /// Emits the event built by `build` if `min` is enabled. `build` is not
    /// called otherwise.
    #[inline]
    pub fn emit_with(&self, min: DiagnosticsLevel, build: impl FnOnce() -> EvidenceEvent) {
        if self.enabled(min) {
            self.sink.emit(build());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn round() -> EvidenceEvent {
        EvidenceEvent::SchedulerRound {
            round: 1,
            topics: 2,
            remaining: 0,
        }
    }

    #[test]
    fn off_never_builds_events() {
        let sink = Arc::new(MemorySink::new());
        let evidence = Evidence::new(DiagnosticsLevel::Off, sink.clone());
        let built = Cell::new(false);
        evidence.emit_with(DiagnosticsLevel::Light, || {
            built.set(true);
            round()
        });
        assert!(!built.get());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn levels_gate_events() {
        let sink = Arc::new(MemorySink::new());
        let evidence = Evidence::new(DiagnosticsLevel::Light, sink.clone());
        evidence.emit_with(DiagnosticsLevel::Light, round);
        evidence.emit_with(DiagnosticsLevel::Full, round);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn wire_shape() {
        let event = EvidenceEvent::StateUpdate {
            topic: "cart#1".into(),
            txn_id: "cart#1::t1".into(),
            txn_seq: 1,
            commit_mode: CommitMode::Batch,
            priority: Priority::Normal,
            origin_kind: OriginKind::Action,
            origin_name: "add".into(),
            coalesced_count: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state:update");
        assert_eq!(json["txnSeq"], 1);
        assert_eq!(json["commitMode"], "batch");
        assert_eq!(json["coalescedCount"], 1);
    }
}
