// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Module definitions: initial state, traits, reducers and logic units.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tributary_converge::{
    BuildError, DependencyGraph, FieldPath, ModuleOverride, StateSchema, TraitSet,
};

use crate::draft::StateDraft;
use crate::error::{DraftError, RuntimeError};
use crate::lifecycle::Lifecycle;
use crate::queue::{ModuleId, Topic};
use crate::runtime::RuntimeHandle;
use crate::tasks::TaskPolicy;

/// Applies one action payload to a draft.
pub type Reducer = Arc<dyn Fn(&mut StateDraft, &Value) -> Result<(), DraftError> + Send + Sync>;

/// Runs once per instance, before the instance's first transaction.
pub type LogicFn = Arc<dyn Fn(&mut SetupContext<'_>) + Send + Sync>;

/// Async effect of a [`Reaction`].
pub type ReactionFn = Arc<dyn Fn(ReactionContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Input of a reaction effect.
#[derive(Clone, Debug)]
pub struct ReactionContext {
    /// Instance whose state changed.
    pub topic: Topic,
    /// New value at the watched path (`null` when missing).
    pub value: Value,
    /// For dispatching follow-up actions.
    pub handle: RuntimeHandle,
}

/// An effect triggered after a commit that changed the value at `watch`.
#[derive(Clone)]
pub struct Reaction {
    pub(crate) name: String,
    pub(crate) watch: FieldPath,
    pub(crate) policy: TaskPolicy,
    pub(crate) effect: ReactionFn,
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("watch", &self.watch)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// What a logic unit can register while its instance is set up.
#[derive(Debug)]
pub struct SetupContext<'a> {
    topic: &'a Topic,
    lifecycle: &'a mut Lifecycle,
    reactions: &'a mut Vec<Reaction>,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(
        topic: &'a Topic,
        lifecycle: &'a mut Lifecycle,
        reactions: &'a mut Vec<Reaction>,
    ) -> Self {
        Self {
            topic,
            lifecycle,
            reactions,
        }
    }

    /// The instance being set up.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        self.topic
    }

    /// Lifecycle hooks of the instance.
    pub fn lifecycle(&mut self) -> &mut Lifecycle {
        self.lifecycle
    }

    /// Runs `effect` under `policy` whenever a commit changes the value at
    /// `watch`. The call-site key of the task runner is `name`.
    pub fn react<F, Fut>(
        &mut self,
        name: impl Into<String>,
        watch: &str,
        policy: TaskPolicy,
        effect: F,
    ) -> Result<(), DraftError>
    where
        F: Fn(ReactionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.reactions.push(Reaction {
            name: name.into(),
            watch: watch.parse()?,
            policy,
            effect: Arc::new(move |cx| effect(cx).boxed()),
        });
        Ok(())
    }
}

/// A compiled module definition, shared by all of its instances.
///
/// The dependency graph is built once here; instances share it read-only
/// until they install traits of their own.
pub struct ModuleDef {
    id: ModuleId,
    initial_state: Value,
    schema: StateSchema,
    traits: TraitSet,
    graph: Arc<DependencyGraph>,
    reducers: HashMap<String, Reducer>,
    logic: Vec<(String, LogicFn)>,
    module_override: Option<ModuleOverride>,
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reducers: Vec<_> = self.reducers.keys().collect();
        reducers.sort();
        f.debug_struct("ModuleDef")
            .field("id", &self.id)
            .field("traits", &self.traits.len())
            .field("graph", &self.graph)
            .field("reducers", &reducers)
            .field("logic", &self.logic.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("module_override", &self.module_override)
            .finish_non_exhaustive()
    }
}

impl ModuleDef {
    /// Starts a definition.
    pub fn builder(id: impl Into<Arc<str>>, initial_state: Value) -> ModuleBuilder {
        ModuleBuilder {
            id: ModuleId::new(id),
            initial_state,
            fields: Vec::new(),
            traits: TraitSet::new(),
            reducers: HashMap::new(),
            logic: Vec::new(),
            module_override: None,
        }
    }

    /// Module id.
    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// State a new instance starts from, before derivation.
    #[must_use]
    pub fn initial_state(&self) -> &Value {
        &self.initial_state
    }

    /// Known paths of the initial state.
    #[must_use]
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Declared traits.
    #[must_use]
    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    /// The shared dependency graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    /// Reducer for action type `kind`.
    #[must_use]
    pub fn reducer(&self, kind: &str) -> Option<&Reducer> {
        self.reducers.get(kind)
    }

    pub(crate) fn logic(&self) -> &[(String, LogicFn)] {
        &self.logic
    }

    /// Default override of the module's instances.
    #[must_use]
    pub fn module_override(&self) -> Option<&ModuleOverride> {
        self.module_override.as_ref()
    }
}

/// Builder for [`ModuleDef`].
pub struct ModuleBuilder {
    id: ModuleId,
    initial_state: Value,
    fields: Vec<String>,
    traits: TraitSet,
    reducers: HashMap<String, Reducer>,
    logic: Vec<(String, LogicFn)>,
    module_override: Option<ModuleOverride>,
}

impl fmt::Debug for ModuleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBuilder")
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("traits", &self.traits.len())
            .field("reducers", &self.reducers.len())
            .field("logic", &self.logic.len())
            .finish_non_exhaustive()
    }
}

impl ModuleBuilder {
    /// Declares state paths the initial state does not show, such as the
    /// item shape of a list that starts empty (`items[].price`).
    ///
    /// Ancestors are declared too. Paths are checked when the module is
    /// built.
    #[must_use]
    pub fn fields<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Adds trait declarations.
    #[must_use]
    pub fn traits(mut self, traits: TraitSet) -> Self {
        self.traits.extend(&traits);
        self
    }

    /// Registers the reducer for action type `kind`.
    #[must_use]
    pub fn reducer(
        mut self,
        kind: impl Into<String>,
        reducer: impl Fn(&mut StateDraft, &Value) -> Result<(), DraftError> + Send + Sync + 'static,
    ) -> Self {
        self.reducers.insert(kind.into(), Arc::new(reducer));
        self
    }

    /// Adds a logic unit, run in registration order for every new instance.
    #[must_use]
    pub fn logic(
        mut self,
        name: impl Into<String>,
        setup: impl Fn(&mut SetupContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.logic.push((name.into(), Arc::new(setup)));
        self
    }

    /// Sets the default override of the module's instances.
    #[must_use]
    pub fn module_override(mut self, module_override: ModuleOverride) -> Self {
        self.module_override = Some(module_override);
        self
    }

    /// Compiles the traits against the initial state and declared fields.
    pub fn build(self) -> Result<Arc<ModuleDef>, RuntimeError> {
        let mut schema = StateSchema::from_value(&self.initial_state);
        for text in &self.fields {
            let path = FieldPath::parse(text).map_err(|source| RuntimeError::Build {
                module: self.id.to_string(),
                source: BuildError::InvalidPath {
                    target: text.clone(),
                    source,
                },
            })?;
            schema.insert(&path);
        }
        let graph = DependencyGraph::build(&self.traits, &schema).map_err(|source| {
            RuntimeError::Build {
                module: self.id.to_string(),
                source,
            }
        })?;
        Ok(Arc::new(ModuleDef {
            id: self.id,
            initial_state: self.initial_state,
            schema,
            traits: self.traits,
            graph: Arc::new(graph),
            reducers: self.reducers,
            logic: self.logic,
            module_override: self.module_override,
        }))
    }
}
