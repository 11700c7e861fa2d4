// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trait declarations: which fields are derived, and from what.
//!
//! A *trait* marks a field as derived instead of freely writable. Domain
//! layers (forms, queries) only declare traits; the dependency graph builder
//! compiles them and the executor evaluates them.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Failure reported by a derive function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeriveError(pub String);

impl DeriveError {
    /// Creates an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Computes a derived value from dependency values (in declaration order).
pub type DeriveFn = Arc<dyn Fn(&[&Value]) -> Result<Value, DeriveError> + Send + Sync>;
/// Returns `true` when two values should be treated as equal (no write).
pub type EqualsFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
/// Maps a linked value before it is written.
pub type TransformFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
/// Derives a resource key from dependency values; `None` means idle.
pub type KeyFn = Arc<dyn Fn(&[&Value]) -> Option<Value> + Send + Sync>;

/// A field computed from other fields.
#[derive(Clone)]
pub struct Computed {
    pub(crate) deps: Vec<String>,
    pub(crate) get: DeriveFn,
    pub(crate) equals: Option<EqualsFn>,
}

impl Computed {
    /// Declares an infallible computed field.
    pub fn new<I, S, F>(deps: I, get: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[&Value]) -> Value + Send + Sync + 'static,
    {
        Self::try_new(deps, move |values| Ok(get(values)))
    }

    /// Declares a computed field whose derive function can fail.
    ///
    /// A failure aborts the transaction that triggered it.
    pub fn try_new<I, S, F>(deps: I, get: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[&Value]) -> Result<Value, DeriveError> + Send + Sync + 'static,
    {
        Self {
            deps: deps.into_iter().map(Into::into).collect(),
            get: Arc::new(get),
            equals: None,
        }
    }

    /// Replaces the default `Value` equality used to suppress no-op writes.
    #[must_use]
    pub fn with_equals(
        mut self,
        equals: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equals = Some(Arc::new(equals));
        self
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("deps", &self.deps)
            .field("custom_equals", &self.equals.is_some())
            .finish_non_exhaustive()
    }
}

/// A field that mirrors another field, optionally transformed.
#[derive(Clone)]
pub struct Link {
    pub(crate) from: String,
    pub(crate) transform: Option<TransformFn>,
}

impl Link {
    /// Declares a plain copy of `from`.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            transform: None,
        }
    }

    /// Applies `transform` to the linked value before writing.
    #[must_use]
    pub fn with_transform(mut self, transform: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("from", &self.from)
            .field("transformed", &self.transform.is_some())
            .finish()
    }
}

/// A field backed by an external resource.
///
/// The executor only derives the key and records a load request; the
/// resource collaborator loads the value. The target field holds a snapshot
/// object `{ status, keyHash, data, error }`.
#[derive(Clone)]
pub struct Source {
    pub(crate) resource: String,
    pub(crate) deps: Vec<String>,
    pub(crate) key: KeyFn,
}

impl Source {
    /// Declares a source field loaded from `resource` with a key derived
    /// from `deps`.
    pub fn new<I, S, F>(resource: impl Into<String>, deps: I, key: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[&Value]) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            resource: resource.into(),
            deps: deps.into_iter().map(Into::into).collect(),
            key: Arc::new(key),
        }
    }

    /// Resource id this source loads from.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("resource", &self.resource)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// One trait declaration.
#[derive(Clone, Debug)]
pub enum TraitDecl {
    /// See [`Computed`].
    Computed(Computed),
    /// See [`Link`].
    Link(Link),
    /// See [`Source`].
    Source(Source),
}

impl TraitDecl {
    /// Declared dependency paths, as written.
    #[must_use]
    pub fn deps(&self) -> Vec<&str> {
        match self {
            Self::Computed(c) => c.deps.iter().map(String::as_str).collect(),
            Self::Link(l) => vec![l.from.as_str()],
            Self::Source(s) => s.deps.iter().map(String::as_str).collect(),
        }
    }
}

/// Ordered trait declarations of a module, keyed by target field path.
///
/// Declaration order is significant: node ids follow it, and so does the
/// static digest.
#[derive(Clone, Debug, Default)]
pub struct TraitSet {
    decls: Vec<(String, TraitDecl)>,
}

impl TraitSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a computed field.
    #[must_use]
    pub fn computed(mut self, target: impl Into<String>, decl: Computed) -> Self {
        self.insert(target, TraitDecl::Computed(decl));
        self
    }

    /// Adds a linked field.
    #[must_use]
    pub fn link(mut self, target: impl Into<String>, decl: Link) -> Self {
        self.insert(target, TraitDecl::Link(decl));
        self
    }

    /// Adds a source field.
    #[must_use]
    pub fn source(mut self, target: impl Into<String>, decl: Source) -> Self {
        self.insert(target, TraitDecl::Source(decl));
        self
    }

    /// Appends a declaration.
    pub fn insert(&mut self, target: impl Into<String>, decl: TraitDecl) {
        self.decls.push((target.into(), decl));
    }

    /// Appends every declaration of `other`.
    pub fn extend(&mut self, other: &Self) {
        self.decls.extend(other.decls.iter().cloned());
    }

    /// Removes every declaration targeting `target`. Returns how many were
    /// removed.
    pub fn remove(&mut self, target: &str) -> usize {
        let before = self.decls.len();
        self.decls.retain(|(t, _)| t != target);
        before - self.decls.len()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Returns `true` if there are no declarations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Iterates `(target, declaration)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TraitDecl)> + '_ {
        self.decls.iter().map(|(t, d)| (t.as_str(), d))
    }
}
