// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The runtime driver: dispatch, commit pipeline, instance management.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tributary_converge::{
    DependencyGraph, DirtySet, FieldPath, ModuleOverride, SourceRequest, TraitSet, state,
};

use crate::config::RuntimeConfig;
use crate::draft::StateDraft;
use crate::error::{DispatchError, LifecycleError, RuntimeError};
use crate::evidence::{DiagnosticsLevel, Evidence, EvidenceEvent, EvidenceSink, TracingSink};
use crate::instance::{Committed, ModuleInstance};
use crate::lifecycle::LifecycleStatus;
use crate::module::{ModuleDef, ReactionContext};
use crate::queue::{CommitMeta, InstanceId, JobQueue, PendingCommit, Topic};
use crate::resource::{
    ResourceLoader, ResourceRegistry, error_snapshot, snapshot_key_hash, success_snapshot,
};
use crate::scheduler::{FlushReport, HostScheduler, SchedulerState, TickScheduler};
use crate::tasks::TaskPolicy;
use crate::txn::{Action, CommitMode, OriginKind, Priority, Transaction};

type Reply = oneshot::Sender<Result<Transaction, DispatchError>>;

/// A finished resource load, addressed to the snapshot that asked for it.
#[derive(Debug)]
pub(crate) struct SettledSource {
    topic: Topic,
    path: FieldPath,
    resource: String,
    key_hash: String,
    result: Result<Value, String>,
}

#[derive(Debug)]
pub(crate) enum RuntimeCommand {
    Dispatch {
        topic: Topic,
        actions: Vec<Action>,
        commit_mode: CommitMode,
        reply: Option<Reply>,
    },
    SourceSettled(SettledSource),
    Drain,
    Shutdown,
}

/// Cloneable handle for talking to a [`Runtime`] from tasks and other
/// threads.
///
/// Commands are processed by [`Runtime::run`] or [`Runtime::pump`].
#[derive(Clone, Debug)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<RuntimeCommand>,
}

impl RuntimeHandle {
    fn send(&self, command: RuntimeCommand) -> Result<(), RuntimeError> {
        self.tx.send(command).map_err(|_| RuntimeError::Closed)
    }

    async fn request(
        &self,
        topic: Topic,
        actions: Vec<Action>,
        commit_mode: CommitMode,
    ) -> Result<Transaction, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.send(RuntimeCommand::Dispatch {
            topic,
            actions,
            commit_mode,
            reply: Some(tx),
        })?;
        match rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RuntimeError::Closed),
        }
    }

    /// Dispatches `action` and waits for the transaction to be accepted.
    pub async fn dispatch(&self, topic: Topic, action: Action) -> Result<Transaction, RuntimeError> {
        self.request(topic, vec![action], CommitMode::Normal).await
    }

    /// Dispatches `actions` as one batch transaction and waits for it to be
    /// accepted.
    pub async fn dispatch_batch(
        &self,
        topic: Topic,
        actions: Vec<Action>,
    ) -> Result<Transaction, RuntimeError> {
        self.request(topic, actions, CommitMode::Batch).await
    }

    /// Dispatches `action` without waiting. Refusals are logged.
    pub fn post(&self, topic: Topic, action: Action) -> Result<(), RuntimeError> {
        self.send(RuntimeCommand::Dispatch {
            topic,
            actions: vec![action],
            commit_mode: CommitMode::Normal,
            reply: None,
        })
    }

    /// Asks the runtime to flush.
    pub fn request_drain(&self) -> Result<(), RuntimeError> {
        self.send(RuntimeCommand::Drain)
    }

    /// Asks [`Runtime::run`] to tear down every instance and return.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(RuntimeCommand::Shutdown)
    }

    fn settle(&self, settled: SettledSource) {
        if self.send(RuntimeCommand::SourceSettled(settled)).is_err() {
            tracing::debug!("runtime gone, resource result dropped");
        }
    }
}

/// Host that turns drain requests into runtime commands.
#[derive(Debug)]
struct ChannelHost {
    tx: mpsc::UnboundedSender<RuntimeCommand>,
}

impl HostScheduler for ChannelHost {
    fn schedule_drain(&self) {
        let _ = self.tx.send(RuntimeCommand::Drain);
    }
}

/// Borrowed pieces of the runtime a commit needs.
struct CommitContext<'a> {
    config: &'a RuntimeConfig,
    evidence: &'a Evidence,
    resources: &'a ResourceRegistry,
    handle: &'a RuntimeHandle,
}

/// Owns every module instance and drives their transactions.
///
/// The runtime is a single-owner driver: all mutation goes through
/// `&mut self`, so instances need no locks. Async collaborators reach it
/// through a [`RuntimeHandle`].
///
/// Anything that spawns tasks (reactions, resource loads, teardown) must
/// run inside a tokio runtime.
pub struct Runtime {
    config: RuntimeConfig,
    queue: JobQueue,
    scheduler: TickScheduler,
    instances: HashMap<Topic, ModuleInstance>,
    closed: HashSet<Topic>,
    resources: ResourceRegistry,
    evidence: Evidence,
    host: Arc<dyn HostScheduler>,
    handle: RuntimeHandle,
    commands: mpsc::UnboundedReceiver<RuntimeCommand>,
    next_instance: u64,
    drain_requested: bool,
    stopping: bool,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("scheduler", &self.scheduler)
            .field("instances", &self.instances.len())
            .field("resources", &self.resources)
            .field("evidence", &self.evidence)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// A runtime whose drain requests go to its own command channel, to be
    /// served by [`Runtime::run`] or [`Runtime::pump`].
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Arc::new(ChannelHost { tx: tx.clone() });
        Self::assemble(config, host, tx, rx)
    }

    /// A runtime whose drain requests go to `host`.
    #[must_use]
    pub fn with_host(config: RuntimeConfig, host: Arc<dyn HostScheduler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::assemble(config, host, tx, rx)
    }

    fn assemble(
        config: RuntimeConfig,
        host: Arc<dyn HostScheduler>,
        tx: mpsc::UnboundedSender<RuntimeCommand>,
        commands: mpsc::UnboundedReceiver<RuntimeCommand>,
    ) -> Self {
        Self {
            queue: JobQueue::new(),
            scheduler: TickScheduler::new(config.scheduler.clone()),
            instances: HashMap::new(),
            closed: HashSet::new(),
            resources: ResourceRegistry::new(),
            evidence: Evidence::new(config.diagnostics, Arc::new(TracingSink)),
            host,
            handle: RuntimeHandle { tx },
            commands,
            next_instance: 0,
            drain_requested: false,
            stopping: false,
            config,
        }
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A handle for async collaborators.
    #[must_use]
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Sends evidence to `sink`, gated by the configured diagnostics level.
    pub fn set_evidence_sink(&mut self, sink: Arc<dyn EvidenceSink>) {
        self.evidence = Evidence::new(self.config.diagnostics, sink);
    }

    /// Registers the loader for resource `id`.
    pub fn register_resource(&mut self, id: impl Into<String>, loader: impl ResourceLoader + 'static) {
        self.resources.register(id, loader);
    }

    /// Scheduler state.
    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Live topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.instances.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Committed state of `topic`.
    #[must_use]
    pub fn state(&self, topic: &Topic) -> Option<&Value> {
        self.instances.get(topic).map(ModuleInstance::state)
    }

    /// Lifecycle status of `topic`.
    #[must_use]
    pub fn status(&self, topic: &Topic) -> Option<LifecycleStatus> {
        self.instances.get(topic).map(|i| i.lifecycle.status())
    }

    /// Trait generation of `topic`.
    #[must_use]
    pub fn generation(&self, topic: &Topic) -> Option<u64> {
        self.instances.get(topic).map(ModuleInstance::generation)
    }

    /// Dependency graph `topic` currently converges with.
    #[must_use]
    pub fn graph(&self, topic: &Topic) -> Option<&Arc<DependencyGraph>> {
        self.instances.get(topic).map(ModuleInstance::graph)
    }

    /// Returns `true` if `topic` has a commit waiting for the scheduler.
    #[must_use]
    pub fn has_pending(&self, topic: &Topic) -> bool {
        self.queue.pending_state(topic).is_some()
    }

    fn instance_mut(&mut self, topic: &Topic) -> Result<&mut ModuleInstance, DispatchError> {
        lookup(&mut self.instances, &self.closed, topic)
    }

    /// Creates an instance of `def`: runs its logic units and derives its
    /// initial state.
    ///
    /// Init effects registered by the logic units are still pending; the
    /// instance reports [`LifecycleStatus::Initializing`] until
    /// [`Runtime::run_init`] completes them.
    pub fn create_instance(&mut self, def: &Arc<ModuleDef>) -> Result<Topic, RuntimeError> {
        self.next_instance += 1;
        let topic = Topic {
            module: def.id().clone(),
            instance: InstanceId(self.next_instance),
        };
        let mut instance = ModuleInstance::new(
            topic.clone(),
            def.clone(),
            &self.config.converge,
            self.config.tasks.parallel_cap,
        );
        let requests = instance
            .initialize(&self.config.converge)
            .map_err(|source| RuntimeError::InitialState {
                topic: topic.clone(),
                source,
            })?;
        tracing::info!(
            topic = %topic,
            nodes = instance.graph().node_count(),
            digest = %instance.graph().digest(),
            "instance created"
        );
        let cx = CommitContext {
            config: &self.config,
            evidence: &self.evidence,
            resources: &self.resources,
            handle: &self.handle,
        };
        load_sources(&mut instance, requests, &cx);
        self.instances.insert(topic.clone(), instance);
        Ok(topic)
    }

    /// Runs the pending init effects of `topic`.
    ///
    /// On failure the instance is destroyed and the init error returned.
    pub async fn run_init(&mut self, topic: &Topic) -> Result<(), RuntimeError> {
        let instance = self.instance_mut(topic)?;
        let result = instance.lifecycle.run_init().await;
        if let Err(err) = result {
            self.destroy_instance(topic).await?;
            return Err(err.into());
        }
        Ok(())
    }

    /// [`Runtime::create_instance`] followed by [`Runtime::run_init`].
    pub async fn instantiate(&mut self, def: &Arc<ModuleDef>) -> Result<Topic, RuntimeError> {
        let topic = self.create_instance(def)?;
        self.run_init(&topic).await?;
        Ok(topic)
    }

    /// Tears `topic` down.
    ///
    /// The scheduler forgets the topic, in-flight tasks are interrupted and
    /// awaited, destroy effects run, and error handlers hear about the
    /// interruptions. Failures along the way are returned, never raised.
    pub async fn destroy_instance(&mut self, topic: &Topic) -> Result<Vec<LifecycleError>, RuntimeError> {
        let Some(mut instance) = self.instances.remove(topic) else {
            return Err(DispatchError::UnknownTopic(topic.clone()).into());
        };
        self.closed.insert(topic.clone());
        self.queue.remove_topic(topic);
        let interrupted = instance.tasks.shutdown().await;
        let failures = instance.lifecycle.teardown(interrupted).await;
        tracing::info!(topic = %topic, failures = failures.len(), "instance destroyed");
        Ok(failures)
    }

    /// Tears down every instance, in topic order.
    pub async fn shutdown(&mut self) {
        for topic in self.topics() {
            if let Err(err) = self.destroy_instance(&topic).await {
                tracing::warn!(topic = %topic, error = %err, "teardown failed");
            }
        }
    }

    /// Sets or clears the module override of `topic`.
    pub fn set_module_override(
        &mut self,
        topic: &Topic,
        module_override: Option<ModuleOverride>,
    ) -> Result<(), DispatchError> {
        self.instance_mut(topic)?.set_module_override(module_override);
        Ok(())
    }

    /// Adds trait declarations to `topic`, bumping its generation and
    /// scheduling a full recompute. Returns the new generation.
    pub fn install_traits(&mut self, topic: &Topic, traits: &TraitSet) -> Result<u64, RuntimeError> {
        let instance = self.instance_mut(topic)?;
        let mut next = instance.traits().clone();
        next.extend(traits);
        self.change_traits(topic, next)
    }

    /// Removes the declaration targeting `target` from `topic`. Returns the
    /// new generation, or the current one if nothing targeted `target`.
    pub fn remove_trait(&mut self, topic: &Topic, target: &str) -> Result<u64, RuntimeError> {
        let instance = self.instance_mut(topic)?;
        let mut next = instance.traits().clone();
        if next.remove(target) == 0 {
            return Ok(instance.generation());
        }
        self.change_traits(topic, next)
    }

    fn change_traits(&mut self, topic: &Topic, traits: TraitSet) -> Result<u64, RuntimeError> {
        let instance = lookup(&mut self.instances, &self.closed, topic)?;
        let generation = instance.replace_traits(traits)?;
        let txn = instance.begin(
            CommitMode::Normal,
            Priority::Normal,
            OriginKind::Scheduler,
            "traits_changed",
        );
        let mut dirty = DirtySet::new();
        dirty.mark_all();
        let base = pending_or_committed(&self.queue, instance);
        self.enqueue(topic, base, CommitMeta::new(txn, dirty));
        Ok(generation)
    }

    /// Applies `action` to `topic` as one transaction.
    ///
    /// The commit is queued; derived fields converge on the next flush.
    pub fn dispatch(&mut self, topic: &Topic, action: Action) -> Result<Transaction, DispatchError> {
        self.submit(topic, vec![action], CommitMode::Normal)
    }

    /// Applies `actions` to one draft as a single `batch` transaction.
    pub fn dispatch_batch(
        &mut self,
        topic: &Topic,
        actions: Vec<Action>,
    ) -> Result<Transaction, DispatchError> {
        if actions.is_empty() {
            return Err(DispatchError::EmptyBatch);
        }
        self.submit(topic, actions, CommitMode::Batch)
    }

    fn submit(
        &mut self,
        topic: &Topic,
        actions: Vec<Action>,
        commit_mode: CommitMode,
    ) -> Result<Transaction, DispatchError> {
        let instance = lookup(&mut self.instances, &self.closed, topic)?;
        let mut reducers = Vec::with_capacity(actions.len());
        for action in &actions {
            let reducer = instance.def().reducer(&action.kind).ok_or_else(|| {
                DispatchError::UnknownAction {
                    module: topic.module.to_string(),
                    kind: action.kind.clone(),
                }
            })?;
            reducers.push(reducer.clone());
        }

        let priority = actions
            .iter()
            .map(|a| a.priority)
            .max()
            .unwrap_or_default();
        let origin = actions
            .iter()
            .map(|a| a.kind.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let txn = instance.begin(commit_mode, priority, OriginKind::Action, origin);

        let mut draft = StateDraft::new(pending_or_committed(&self.queue, instance));
        for (action, reducer) in actions.iter().zip(&reducers) {
            reducer(&mut draft, &action.payload).map_err(|source| DispatchError::Reducer {
                txn_seq: txn.txn_seq,
                kind: action.kind.clone(),
                source,
            })?;
        }
        let (state, dirty) = draft.into_parts();
        tracing::trace!(topic = %topic, txn = %txn.txn_id, "transaction queued");
        self.enqueue(topic, state, CommitMeta::new(txn.clone(), dirty));
        Ok(txn)
    }

    fn enqueue(&mut self, topic: &Topic, state: Value, meta: CommitMeta) {
        let priority = meta.priority;
        self.queue.enqueue_module_commit(topic.clone(), state, meta);
        self.queue.mark_topic_dirty(topic.clone(), priority);
        self.host.schedule_drain();
    }

    fn settle_source(&mut self, settled: SettledSource) {
        let Some(instance) = self.instances.get_mut(&settled.topic) else {
            tracing::debug!(topic = %settled.topic, "resource result for a gone instance dropped");
            return;
        };
        let base = pending_or_committed(&self.queue, instance);
        let current = state::get(&base, &settled.path);
        if current.and_then(snapshot_key_hash) != Some(settled.key_hash.as_str()) {
            tracing::warn!(
                topic = %settled.topic,
                path = %settled.path,
                resource = %settled.resource,
                "stale resource result dropped"
            );
            return;
        }
        let snapshot = match settled.result {
            Ok(data) => success_snapshot(&settled.key_hash, data),
            Err(message) => {
                let data = current
                    .and_then(|s| s.get("data"))
                    .cloned()
                    .unwrap_or(Value::Null);
                error_snapshot(&settled.key_hash, data, &message)
            }
        };
        let mut draft = StateDraft::new(base.clone());
        if let Err(err) = draft.set_path(settled.path.clone(), snapshot) {
            tracing::warn!(topic = %settled.topic, error = %err, "resource result not writable");
            return;
        }
        let txn = instance.begin(
            CommitMode::Normal,
            Priority::Normal,
            OriginKind::Source,
            settled.resource,
        );
        let (state, dirty) = draft.into_parts();
        self.enqueue(&settled.topic, state, CommitMeta::new(txn, dirty));
    }

    /// Drains dirty topics now: converges and commits each pending commit.
    pub fn flush(&mut self) -> FlushReport {
        self.drain_requested = false;
        let Self {
            config,
            queue,
            scheduler,
            instances,
            resources,
            evidence,
            host,
            handle,
            ..
        } = self;
        let cx = CommitContext {
            config,
            evidence,
            resources,
            handle,
        };
        scheduler.flush_now(queue, host.as_ref(), evidence, |queue, topic, payload| {
            match instances.get_mut(topic) {
                Some(instance) => commit(instance, queue, payload, &cx),
                None => Ok(()),
            }
        })
    }

    fn apply_command(&mut self, command: RuntimeCommand) {
        match command {
            RuntimeCommand::Dispatch {
                topic,
                actions,
                commit_mode,
                reply,
            } => {
                let result = match commit_mode {
                    CommitMode::Normal => self.submit(&topic, actions, commit_mode),
                    CommitMode::Batch => self.dispatch_batch(&topic, actions),
                };
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            tracing::warn!(topic = %topic, error = %err, "posted action refused");
                        }
                    }
                }
            }
            RuntimeCommand::SourceSettled(settled) => self.settle_source(settled),
            RuntimeCommand::Drain => self.drain_requested = true,
            RuntimeCommand::Shutdown => self.stopping = true,
        }
    }

    /// Applies every queued command without waiting, then flushes if a
    /// drain was requested.
    pub fn pump(&mut self) -> Option<FlushReport> {
        while let Ok(command) = self.commands.try_recv() {
            self.apply_command(command);
        }
        if self.drain_requested {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Serves commands until [`RuntimeHandle::shutdown`], yielding to the
    /// tokio scheduler between ticks. Tears every instance down on exit.
    pub async fn run(&mut self) {
        tracing::info!("runtime started");
        while !self.stopping {
            let Some(command) = self.commands.recv().await else {
                break;
            };
            self.apply_command(command);
            let _ = self.pump();
            tokio::task::yield_now().await;
        }
        self.shutdown().await;
        tracing::info!("runtime stopped");
    }
}

fn lookup<'a>(
    instances: &'a mut HashMap<Topic, ModuleInstance>,
    closed: &HashSet<Topic>,
    topic: &Topic,
) -> Result<&'a mut ModuleInstance, DispatchError> {
    if closed.contains(topic) {
        return Err(DispatchError::InstanceClosed(topic.clone()));
    }
    instances
        .get_mut(topic)
        .ok_or_else(|| DispatchError::UnknownTopic(topic.clone()))
}

fn pending_or_committed(queue: &JobQueue, instance: &ModuleInstance) -> Value {
    queue
        .pending_state(instance.topic())
        .unwrap_or(instance.state())
        .clone()
}

/// Converges one drained commit and runs its after-commit work.
fn commit(
    instance: &mut ModuleInstance,
    queue: &mut JobQueue,
    payload: PendingCommit,
    cx: &CommitContext<'_>,
) -> Result<(), String> {
    let PendingCommit { state, meta } = payload;
    let topic = instance.topic().clone();
    let committed = match instance.converge(state, &meta.dirty, &cx.config.converge) {
        Ok(committed) => committed,
        Err(source) => {
            let err = LifecycleError::Converge {
                txn_seq: meta.txn_seq(),
                source,
            };
            instance.lifecycle.report(&err);
            let message = err.to_string();
            cx.evidence.emit_with(DiagnosticsLevel::Light, || EvidenceEvent::TopicError {
                topic: topic.to_string(),
                txn_seq: meta.txn_seq(),
                message: message.clone(),
            });
            return Err(message);
        }
    };

    emit_commit(instance, &meta, &committed, cx.evidence);
    fire_reactions(instance, &committed.previous, cx);
    load_sources(instance, committed.source_requests, cx);

    if committed.deferred {
        let txn = instance.begin(
            CommitMode::Normal,
            Priority::Normal,
            OriginKind::Scheduler,
            "time_slice",
        );
        let state = instance.state().clone();
        queue.enqueue_module_commit(topic.clone(), state, CommitMeta::new(txn, DirtySet::new()));
        queue.mark_topic_dirty(topic, Priority::Normal);
    }
    Ok(())
}

fn emit_commit(instance: &ModuleInstance, meta: &CommitMeta, committed: &Committed, evidence: &Evidence) {
    let topic = instance.topic();
    evidence.emit_with(DiagnosticsLevel::Light, || EvidenceEvent::StateUpdate {
        topic: topic.to_string(),
        txn_id: meta.first.txn_id.clone(),
        txn_seq: meta.txn_seq(),
        commit_mode: meta.first.commit_mode,
        priority: meta.priority,
        origin_kind: meta.first.origin_kind,
        origin_name: meta.first.origin_name.clone(),
        coalesced_count: meta.count,
    });
    evidence.emit_with(DiagnosticsLevel::Light, || EvidenceEvent::ConvergeTrace {
        topic: topic.to_string(),
        txn_seq: meta.txn_seq(),
        executed_mode: committed.executed_mode,
        reasons: committed.reasons.clone(),
        static_ir_digest: instance.graph().digest().to_string(),
        execution_budget_ms: committed.budget_ms,
        execution_duration_ms: committed.stats.duration_ms,
        step_stats: committed.stats.clone(),
        dirty_paths: evidence.enabled(DiagnosticsLevel::Full).then(|| {
            committed
                .written
                .paths()
                .map(|paths| paths.iter().map(ToString::to_string).collect())
                .unwrap_or_default()
        }),
    });
}

/// Triggers every reaction whose watched value differs from `previous`.
fn fire_reactions(instance: &mut ModuleInstance, previous: &Value, cx: &CommitContext<'_>) {
    let fired: Vec<_> = instance
        .reactions()
        .iter()
        .filter_map(|reaction| {
            let before = state::get(previous, &reaction.watch);
            let after = state::get(instance.state(), &reaction.watch);
            (before != after).then(|| (reaction.clone(), after.cloned().unwrap_or(Value::Null)))
        })
        .collect();
    for (reaction, value) in fired {
        let effect = (reaction.effect)(ReactionContext {
            topic: instance.topic().clone(),
            value,
            handle: cx.handle.clone(),
        });
        let triggered = instance.tasks.trigger(&reaction.name, reaction.policy, effect);
        tracing::trace!(topic = %instance.topic(), reaction = %reaction.name, ?triggered, "reaction");
    }
}

/// Starts a load per request, one `switch` call site per snapshot path.
fn load_sources(instance: &mut ModuleInstance, requests: Vec<SourceRequest>, cx: &CommitContext<'_>) {
    for request in requests {
        let topic = instance.topic().clone();
        let handle = cx.handle.clone();
        let Some(loader) = cx.resources.get(&request.resource) else {
            handle.settle(SettledSource {
                result: Err(format!("no loader registered for resource `{}`", request.resource)),
                topic,
                path: request.path,
                resource: request.resource,
                key_hash: request.key_hash,
            });
            continue;
        };
        let key = format!("source:{}", request.path);
        instance.tasks.trigger(&key, TaskPolicy::Switch, async move {
            let result = loader.load(request.key).await;
            handle.settle(SettledSource {
                topic,
                path: request.path,
                resource: request.resource,
                key_hash: request.key_hash,
                result,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::MemorySink;
    use crate::scheduler::ManualHost;
    use serde_json::json;
    use tributary_converge::Computed;

    fn counter() -> Arc<ModuleDef> {
        ModuleDef::builder("counter", json!({ "count": 0 }))
            .traits(TraitSet::new().computed(
                "double",
                Computed::new(["count"], |v| json!(v[0].as_i64().unwrap_or(0) * 2)),
            ))
            .reducer("inc", |draft, _| {
                draft.update("count", |v| json!(v.as_i64().unwrap_or(0) + 1))
            })
            .reducer("fail", |_, _| Err(crate::error::DraftError::rejected("nope")))
            .build()
            .unwrap()
    }

    fn runtime(host: Arc<ManualHost>) -> (Runtime, Arc<MemorySink>) {
        let config = RuntimeConfig {
            diagnostics: DiagnosticsLevel::Light,
            ..RuntimeConfig::default()
        };
        let mut rt = Runtime::with_host(config, host);
        let sink = Arc::new(MemorySink::new());
        rt.set_evidence_sink(sink.clone());
        (rt, sink)
    }

    #[test]
    fn dispatch_queues_and_flush_commits() {
        let host = Arc::new(ManualHost::new());
        let (mut rt, sink) = runtime(host.clone());
        let topic = rt.create_instance(&counter()).unwrap();
        assert_eq!(rt.state(&topic).unwrap()["double"], json!(0));

        let txn = rt.dispatch(&topic, Action::new("inc", Value::Null)).unwrap();
        assert_eq!(txn.txn_seq, 1);
        assert!(host.take());
        assert!(rt.has_pending(&topic));
        assert_eq!(rt.state(&topic).unwrap()["count"], json!(0));

        let report = rt.flush();
        assert_eq!(report.topics, 1);
        assert_eq!(rt.state(&topic).unwrap()["double"], json!(2));
        assert_eq!(sink.take().len(), 2);
    }

    #[test]
    fn failed_reducers_consume_sequence_numbers() {
        let host = Arc::new(ManualHost::new());
        let (mut rt, _) = runtime(host);
        let topic = rt.create_instance(&counter()).unwrap();
        let err = rt.dispatch(&topic, Action::new("fail", Value::Null)).unwrap_err();
        assert!(matches!(err, DispatchError::Reducer { txn_seq: 1, .. }));
        assert!(!rt.has_pending(&topic));
        let txn = rt.dispatch(&topic, Action::new("inc", Value::Null)).unwrap();
        assert_eq!(txn.txn_seq, 2);

        assert!(matches!(
            rt.dispatch(&topic, Action::new("missing", Value::Null)),
            Err(DispatchError::UnknownAction { .. })
        ));
        assert_eq!(rt.dispatch_batch(&topic, Vec::new()), Err(DispatchError::EmptyBatch));
    }

    #[tokio::test]
    async fn destroyed_topics_are_closed() {
        let host = Arc::new(ManualHost::new());
        let (mut rt, _) = runtime(host);
        let topic = rt.create_instance(&counter()).unwrap();
        rt.dispatch(&topic, Action::new("inc", Value::Null)).unwrap();
        assert!(rt.destroy_instance(&topic).await.unwrap().is_empty());
        assert!(!rt.has_pending(&topic));
        assert_eq!(
            rt.dispatch(&topic, Action::new("inc", Value::Null)),
            Err(DispatchError::InstanceClosed(topic.clone()))
        );
        assert_eq!(rt.flush().topics, 0);
    }

    #[tokio::test]
    async fn handle_commands_are_pumped() {
        let mut rt = Runtime::new(RuntimeConfig::default());
        let topic = rt.create_instance(&counter()).unwrap();
        let handle = rt.handle();
        handle.post(topic.clone(), Action::new("inc", Value::Null)).unwrap();
        handle.post(topic.clone(), Action::new("inc", Value::Null)).unwrap();
        let report = rt.pump().unwrap();
        assert_eq!(report.topics, 1);
        assert_eq!(rt.state(&topic).unwrap()["double"], json!(4));
        assert!(rt.pump().is_none());
    }
}
