// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded task runner owned by one instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, Id, JoinSet};

/// How a call site treats triggers while earlier work is still running.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum TaskPolicy {
    /// Up to `cap` at once; extra triggers wait for a slot.
    Parallel {
        /// Concurrency cap; the runner default when `None`.
        cap: Option<usize>,
    },
    /// A trigger while one is running is dropped.
    Exhaust,
    /// A trigger interrupts the running one.
    Switch,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self::Parallel { cap: None }
    }
}

/// What [`TaskRunner::trigger`] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Triggered {
    /// Spawned and running.
    Started,
    /// Spawned, waiting for a parallel slot.
    Queued,
    /// Ignored under [`TaskPolicy::Exhaust`].
    Dropped,
    /// Spawned after interrupting the previous run under
    /// [`TaskPolicy::Switch`].
    Replaced,
}

/// Clears the exhaust flag however the task ends.
struct Release(Arc<AtomicBool>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs triggered effects as tokio tasks under per-call-site policies.
///
/// Every task lives in one [`JoinSet`], so [`TaskRunner::shutdown`] can
/// interrupt and await all of them.
#[derive(Debug)]
pub struct TaskRunner {
    set: JoinSet<()>,
    labels: HashMap<Id, String>,
    default_cap: usize,
    slots: HashMap<String, Arc<Semaphore>>,
    busy: HashMap<String, Arc<AtomicBool>>,
    latest: HashMap<String, AbortHandle>,
}

impl TaskRunner {
    /// A runner whose parallel call sites default to `default_cap`.
    #[must_use]
    pub fn new(default_cap: usize) -> Self {
        Self {
            set: JoinSet::new(),
            labels: HashMap::new(),
            default_cap: default_cap.max(1),
            slots: HashMap::new(),
            busy: HashMap::new(),
            latest: HashMap::new(),
        }
    }

    /// Tasks spawned and not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.set.len()
    }

    /// Runs `task` for call site `key` under `policy`.
    ///
    /// Must be called within a tokio runtime.
    pub fn trigger<F>(&mut self, key: &str, policy: TaskPolicy, task: F) -> Triggered
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        let (handle, triggered) = match policy {
            TaskPolicy::Parallel { cap } => {
                let cap = cap.unwrap_or(self.default_cap).max(1);
                let slots = self
                    .slots
                    .entry(key.to_owned())
                    .or_insert_with(|| Arc::new(Semaphore::new(cap)))
                    .clone();
                let triggered = if slots.available_permits() == 0 {
                    Triggered::Queued
                } else {
                    Triggered::Started
                };
                let handle = self.set.spawn(async move {
                    let Ok(_permit) = slots.acquire_owned().await else {
                        return;
                    };
                    task.await;
                });
                (handle, triggered)
            }
            TaskPolicy::Exhaust => {
                let busy = self.busy.entry(key.to_owned()).or_default().clone();
                if busy.swap(true, Ordering::AcqRel) {
                    tracing::trace!(key, "exhaust: trigger dropped");
                    return Triggered::Dropped;
                }
                let release = Release(busy);
                let handle = self.set.spawn(async move {
                    let _release = release;
                    task.await;
                });
                (handle, Triggered::Started)
            }
            TaskPolicy::Switch => {
                let previous = self.latest.remove(key);
                let replaced = previous.is_some_and(|prev| {
                    let running = !prev.is_finished();
                    prev.abort();
                    running
                });
                let handle = self.set.spawn(task);
                self.latest.insert(key.to_owned(), handle.clone());
                let triggered = if replaced {
                    tracing::trace!(key, "switch: previous run interrupted");
                    Triggered::Replaced
                } else {
                    Triggered::Started
                };
                (handle, triggered)
            }
        };
        self.labels.insert(handle.id(), key.to_owned());
        triggered
    }

    /// Forgets tasks that already finished.
    pub fn reap(&mut self) {
        while let Some(result) = self.set.try_join_next_with_id() {
            let id = match result {
                Ok((id, ())) => id,
                Err(err) => {
                    if err.is_panic() {
                        tracing::warn!(task = ?self.labels.get(&err.id()), "task panicked");
                    }
                    err.id()
                }
            };
            self.labels.remove(&id);
        }
    }

    /// Interrupts every task and waits until all have stopped.
    ///
    /// Returns the call-site keys of the tasks that were interrupted, sorted.
    pub async fn shutdown(&mut self) -> Vec<String> {
        self.set.abort_all();
        let mut interrupted = Vec::new();
        while let Some(result) = self.set.join_next_with_id().await {
            match result {
                Ok((id, ())) => {
                    self.labels.remove(&id);
                }
                Err(err) => {
                    let label = self.labels.remove(&err.id()).unwrap_or_default();
                    if err.is_cancelled() {
                        interrupted.push(label);
                    } else {
                        tracing::warn!(task = %label, "task panicked");
                    }
                }
            }
        }
        self.slots.clear();
        self.busy.clear();
        self.latest.clear();
        interrupted.sort();
        interrupted
    }
}
