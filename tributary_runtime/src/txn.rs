// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transactions and their metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a transaction was produced.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// One action.
    #[default]
    Normal,
    /// Several actions applied to one draft.
    Batch,
}

/// Scheduling priority. `Urgent` sorts after `Normal`.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Drained in FIFO order.
    #[default]
    Normal,
    /// Drained before normal topics.
    Urgent,
}

/// Who started a transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    /// A caller dispatched an action.
    Action,
    /// A resource load settled.
    Source,
    /// The scheduler resumed deferred work.
    Scheduler,
}

/// Metadata of one atomic state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// `"{instance}::t{seq}"`.
    pub txn_id: String,
    /// Per-instance sequence number, starting at 1.
    pub txn_seq: u64,
    /// Single or batched.
    pub commit_mode: CommitMode,
    /// Scheduling priority.
    pub priority: Priority,
    /// Origin category.
    pub origin_kind: OriginKind,
    /// Action type, resource id or scheduler reason.
    pub origin_name: String,
}

/// Hands out strictly increasing sequence numbers.
#[derive(Clone, Debug, Default)]
pub struct TxnSequencer {
    last: u64,
}

impl TxnSequencer {
    /// A sequencer whose first number is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the next sequence number.
    pub fn next_seq(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// The most recently consumed number (0 before the first).
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }
}

/// A request to change state, routed to the reducer registered for `kind`.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    /// Action type.
    pub kind: String,
    /// Reducer input.
    pub payload: Value,
    /// Scheduling priority of the resulting commit.
    pub priority: Priority,
}

impl Action {
    /// A normal-priority action.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            priority: Priority::Normal,
        }
    }

    /// Raises the action to urgent priority.
    #[must_use]
    pub fn urgent(mut self) -> Self {
        self.priority = Priority::Urgent;
        self
    }
}
