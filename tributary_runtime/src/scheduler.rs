// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tick scheduler: bounded drain rounds over dirty topics.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::SchedulerConfig;
use crate::evidence::{DiagnosticsLevel, Evidence, EvidenceEvent};
use crate::queue::{JobQueue, PendingCommit, Topic};

/// Platform hook that arranges for another drain later.
///
/// Implementations map this to their native mechanism: an event-loop
/// callback, a message to a driver task, a condition variable.
pub trait HostScheduler: Send + Sync {
    /// Requests a follow-up drain. May be called repeatedly before the drain
    /// happens.
    fn schedule_drain(&self);
}

/// Counts drain requests; the embedder decides when to flush.
#[derive(Debug, Default)]
pub struct ManualHost {
    requested: AtomicUsize,
}

impl ManualHost {
    /// A host with no pending request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain requests since the last [`ManualHost::take`].
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requested.load(Ordering::Acquire)
    }

    /// Clears requests. Returns `true` if there were any.
    pub fn take(&self) -> bool {
        self.requested.swap(0, Ordering::AcqRel) > 0
    }
}

impl HostScheduler for ManualHost {
    fn schedule_drain(&self) {
        self.requested.fetch_add(1, Ordering::AcqRel);
    }
}

/// Scheduler state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not flushing.
    #[default]
    Idle,
    /// Inside `flush_now`.
    Draining,
}

/// A topic whose commit failed during a flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicFailure {
    /// The failed topic.
    pub topic: Topic,
    /// Error message.
    pub message: String,
}

/// Summary of one `flush_now` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rounds run.
    pub rounds: usize,
    /// Topics processed (including failed ones).
    pub topics: usize,
    /// Isolated failures.
    pub failures: Vec<TopicFailure>,
    /// Dirty topics were left for the next tick.
    pub rolled_over: bool,
}

/// Drains dirty topics under step and round caps.
#[derive(Debug, Default)]
pub struct TickScheduler {
    config: SchedulerConfig,
    state: SchedulerState,
}

impl TickScheduler {
    /// A scheduler with `config` caps.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: SchedulerState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Caps in force.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs up to `max_drain_rounds` rounds.
    ///
    /// Each round takes up to `max_steps` dirty topics (`urgent_step_cap`
    /// when only urgent topics are dirty) and hands each drained payload to
    /// `process`. Topics dirtied by `process` itself are picked up by later
    /// rounds of the same call. Whatever is still dirty after the last
    /// round rolls over: `host` is asked for another drain.
    ///
    /// A failing topic is recorded and the flush continues.
    pub fn flush_now<F>(
        &mut self,
        queue: &mut JobQueue,
        host: &dyn HostScheduler,
        evidence: &Evidence,
        mut process: F,
    ) -> FlushReport
    where
        F: FnMut(&mut JobQueue, &Topic, PendingCommit) -> Result<(), String>,
    {
        let mut report = FlushReport::default();
        if self.state == SchedulerState::Draining {
            return report;
        }
        self.state = SchedulerState::Draining;

        while report.rounds < self.config.max_drain_rounds && !queue.is_idle() {
            report.rounds += 1;
            let cap = if queue.only_urgent() {
                self.config.urgent_step_cap
            } else {
                self.config.max_steps
            };
            let ready = queue.take_ready(cap.max(1));
            let mut processed = 0;
            for topic in ready {
                let Some(payload) = queue.drain(&topic) else {
                    continue;
                };
                processed += 1;
                tracing::trace!(topic = %topic, round = report.rounds, "drain topic");
                if let Err(message) = process(queue, &topic, payload) {
                    tracing::warn!(topic = %topic, error = %message, "topic failed, continuing drain");
                    report.failures.push(TopicFailure { topic, message });
                }
            }
            report.topics += processed;
            evidence.emit_with(DiagnosticsLevel::Full, || EvidenceEvent::SchedulerRound {
                round: report.rounds,
                topics: processed,
                remaining: queue.dirty_len(),
            });
        }

        if !queue.is_idle() {
            report.rolled_over = true;
            tracing::debug!(
                remaining = queue.dirty_len(),
                rounds = report.rounds,
                "drain round cap reached, rolling over"
            );
            host.schedule_drain();
        }
        self.state = SchedulerState::Idle;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::MemorySink;
    use crate::queue::{CommitMeta, InstanceId, ModuleId};
    use crate::txn::{CommitMode, OriginKind, Priority, Transaction};
    use serde_json::json;
    use std::sync::Arc;
    use tributary_converge::DirtySet;

    fn topic(n: u64) -> Topic {
        Topic {
            module: ModuleId::new("m"),
            instance: InstanceId(n),
        }
    }

    fn enqueue(queue: &mut JobQueue, t: &Topic, priority: Priority) {
        let txn = Transaction {
            txn_id: format!("{t}::t1"),
            txn_seq: 1,
            commit_mode: CommitMode::Normal,
            priority,
            origin_kind: OriginKind::Action,
            origin_name: "x".into(),
        };
        queue.enqueue_module_commit(t.clone(), json!({}), CommitMeta::new(txn, DirtySet::new()));
        queue.mark_topic_dirty(t.clone(), priority);
    }

    fn quiet() -> Evidence {
        Evidence::new(DiagnosticsLevel::Off, Arc::new(MemorySink::new()))
    }

    #[test]
    fn steps_per_round_are_capped() {
        let mut queue = JobQueue::new();
        for n in 0..5 {
            enqueue(&mut queue, &topic(n), Priority::Normal);
        }
        let mut scheduler = TickScheduler::new(SchedulerConfig {
            max_steps: 2,
            urgent_step_cap: 10,
            max_drain_rounds: 2,
        });
        let host = ManualHost::new();
        let mut seen = Vec::new();
        let report = scheduler.flush_now(&mut queue, &host, &quiet(), |_, t, _| {
            seen.push(t.clone());
            Ok(())
        });
        assert_eq!(report.rounds, 2);
        assert_eq!(report.topics, 4);
        assert!(report.rolled_over);
        assert!(host.take());
        assert_eq!(seen, (0..4).map(topic).collect::<Vec<_>>());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn urgent_only_uses_the_urgent_cap() {
        let mut queue = JobQueue::new();
        for n in 0..5 {
            enqueue(&mut queue, &topic(n), Priority::Urgent);
        }
        let mut scheduler = TickScheduler::new(SchedulerConfig {
            max_steps: 1,
            urgent_step_cap: 5,
            max_drain_rounds: 1,
        });
        let host = ManualHost::new();
        let report = scheduler.flush_now(&mut queue, &host, &quiet(), |_, _, _| Ok(()));
        assert_eq!(report.topics, 5);
        assert!(!report.rolled_over);
        assert_eq!(host.requests(), 0);
    }

    #[test]
    fn cascades_run_in_later_rounds_and_failures_are_isolated() {
        let mut queue = JobQueue::new();
        enqueue(&mut queue, &topic(0), Priority::Normal);
        enqueue(&mut queue, &topic(1), Priority::Normal);
        let mut scheduler = TickScheduler::new(SchedulerConfig::default());
        let host = ManualHost::new();
        let sink = Arc::new(MemorySink::new());
        let evidence = Evidence::new(DiagnosticsLevel::Full, sink.clone());

        let report = scheduler.flush_now(&mut queue, &host, &evidence, |queue, t, _| {
            if *t == topic(0) {
                return Err("boom".into());
            }
            if *t == topic(1) {
                enqueue(queue, &topic(2), Priority::Normal);
            }
            Ok(())
        });
        assert_eq!(report.rounds, 2);
        assert_eq!(report.topics, 3);
        assert_eq!(
            report.failures,
            vec![TopicFailure {
                topic: topic(0),
                message: "boom".into()
            }]
        );
        assert!(!report.rolled_over);
        assert_eq!(sink.events().len(), 2);
    }
}
