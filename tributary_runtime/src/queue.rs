// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The job queue: one pending commit per topic, plus the dirty topic set.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tributary_converge::DirtySet;

use crate::txn::{Priority, Transaction};

/// Identifier of a module definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Creates an id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one module instance, unique per runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// The unit of schedulable work: one module instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    /// Module definition.
    pub module: ModuleId,
    /// Instance of that module.
    pub instance: InstanceId,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.module, self.instance.0)
    }
}

/// Transaction metadata of a pending commit, merged across coalesced
/// enqueues.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitMeta {
    /// Earliest transaction folded into this commit.
    pub first: Transaction,
    /// Latest transaction folded into this commit.
    pub last: Transaction,
    /// Number of transactions folded in.
    pub count: usize,
    /// Highest priority of any folded transaction.
    pub priority: Priority,
    /// Set once a second transaction was folded in.
    pub coalesced: bool,
    /// Union of the folded transactions' writes.
    pub dirty: DirtySet,
}

impl CommitMeta {
    /// Metadata of a single transaction.
    #[must_use]
    pub fn new(txn: Transaction, dirty: DirtySet) -> Self {
        Self {
            priority: txn.priority,
            first: txn.clone(),
            last: txn,
            count: 1,
            coalesced: false,
            dirty,
        }
    }

    /// Sequence number reported for the commit (the earliest).
    #[must_use]
    pub fn txn_seq(&self) -> u64 {
        self.first.txn_seq
    }

    fn absorb(&mut self, later: Self) {
        if later.first.txn_seq < self.first.txn_seq {
            self.first = later.first;
        }
        if later.last.txn_seq > self.last.txn_seq {
            self.last = later.last;
        }
        self.count += later.count;
        self.priority = self.priority.max(later.priority);
        self.coalesced = true;
        self.dirty.merge(later.dirty);
    }
}

/// State and metadata waiting to be converged and committed.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingCommit {
    /// Latest draft result.
    pub state: Value,
    /// Merged metadata.
    pub meta: CommitMeta,
}

/// Pending commits per topic and the priority-partitioned dirty topic set.
///
/// A topic holds at most one pending commit: enqueuing again overwrites the
/// state and folds the metadata, so a drain always delivers exactly one
/// payload reflecting the latest state.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: HashMap<Topic, PendingCommit>,
    marked: HashMap<Topic, Priority>,
    urgent: VecDeque<Topic>,
    normal: VecDeque<Topic>,
}

impl JobQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `state` as the topic's pending commit. Returns `true` if an
    /// earlier pending commit was folded in.
    pub fn enqueue_module_commit(&mut self, topic: Topic, state: Value, meta: CommitMeta) -> bool {
        match self.pending.get_mut(&topic) {
            Some(existing) => {
                existing.state = state;
                existing.meta.absorb(meta);
                tracing::debug!(
                    topic = %topic,
                    count = existing.meta.count,
                    first = existing.meta.first.txn_seq,
                    "coalesced pending commit"
                );
                true
            }
            None => {
                self.pending.insert(topic, PendingCommit { state, meta });
                false
            }
        }
    }

    /// Adds `topic` to the dirty set, or raises its priority.
    pub fn mark_topic_dirty(&mut self, topic: Topic, priority: Priority) {
        match self.marked.get(&topic).copied() {
            None => {
                self.queue_for(priority).push_back(topic.clone());
                self.marked.insert(topic, priority);
            }
            Some(Priority::Normal) if priority == Priority::Urgent => {
                self.normal.retain(|t| *t != topic);
                self.urgent.push_back(topic.clone());
                self.marked.insert(topic, Priority::Urgent);
            }
            Some(_) => {}
        }
    }

    fn queue_for(&mut self, priority: Priority) -> &mut VecDeque<Topic> {
        match priority {
            Priority::Urgent => &mut self.urgent,
            Priority::Normal => &mut self.normal,
        }
    }

    /// Pops the topic's pending commit.
    pub fn drain(&mut self, topic: &Topic) -> Option<PendingCommit> {
        self.pending.remove(topic)
    }

    /// State of the topic's pending commit; the base for the next draft.
    #[must_use]
    pub fn pending_state(&self, topic: &Topic) -> Option<&Value> {
        self.pending.get(topic).map(|p| &p.state)
    }

    /// Takes up to `cap` dirty topics, urgent first, FIFO within a priority.
    pub fn take_ready(&mut self, cap: usize) -> Vec<Topic> {
        let mut out = Vec::with_capacity(cap.min(self.dirty_len()));
        while out.len() < cap {
            let Some(topic) = self.urgent.pop_front().or_else(|| self.normal.pop_front()) else {
                break;
            };
            self.marked.remove(&topic);
            out.push(topic);
        }
        out
    }

    /// Forgets everything about `topic`. Returns the dropped pending commit.
    pub fn remove_topic(&mut self, topic: &Topic) -> Option<PendingCommit> {
        if self.marked.remove(topic).is_some() {
            self.urgent.retain(|t| t != topic);
            self.normal.retain(|t| t != topic);
        }
        self.pending.remove(topic)
    }

    /// Number of dirty topics.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.marked.len()
    }

    /// Returns `true` if every dirty topic is urgent (and there is one).
    #[must_use]
    pub fn only_urgent(&self) -> bool {
        !self.urgent.is_empty() && self.normal.is_empty()
    }

    /// Returns `true` if no topic is dirty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.marked.is_empty()
    }
}
