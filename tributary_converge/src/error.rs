// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Build-time and convergence errors.

use thiserror::Error;

use crate::decl::DeriveError;
use crate::path::{FieldPath, PathParseError};
use crate::state::WriteError;

/// Malformed trait declarations, reported when a dependency graph is built.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A target or dependency string is not a valid path.
    #[error("invalid path in declaration of `{target}`: {source}")]
    InvalidPath {
        /// Declared target.
        target: String,
        /// Parse failure.
        #[source]
        source: PathParseError,
    },
    /// A dependency does not resolve to any field of the state schema.
    #[error("`{node}` depends on `{dep}`, which is not a known field")]
    UnresolvedDependency {
        /// Node label (`kind:path`).
        node: String,
        /// The unresolved dependency.
        dep: FieldPath,
    },
    /// Two declarations target the same field.
    #[error("`{0}` is declared more than once")]
    DuplicateTarget(FieldPath),
    /// Only one list level (`[]`) is supported per path.
    #[error("`{0}` nests list scopes")]
    NestedListScope(FieldPath),
    /// An item-level dependency outside the node's own list scope.
    #[error("`{node}` reads item path `{dep}` outside its own list scope")]
    ForeignItemDependency {
        /// Node label (`kind:path`).
        node: String,
        /// The offending dependency.
        dep: FieldPath,
    },
    /// The root path cannot be derived.
    #[error("the state root cannot be a derived field")]
    RootTarget,
}

/// Failure while converging one transaction.
///
/// Every variant is fatal for the transaction: the caller keeps its previous
/// committed state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConvergeError {
    /// Writes kept dirtying already evaluated nodes; likely a cycle without
    /// a fixed point.
    #[error("no fixed point after {cap} passes; still pending: {pending:?}")]
    FixedPointExceeded {
        /// Pass cap (graph depth).
        cap: usize,
        /// Labels of the nodes that were still dirty.
        pending: Vec<String>,
    },
    /// A derive function failed.
    #[error("`{node}` failed: {source}")]
    Derive {
        /// Node label.
        node: String,
        /// Reported failure.
        #[source]
        source: DeriveError,
    },
    /// A derived value could not be written.
    #[error("`{node}` could not write its result: {source}")]
    Write {
        /// Node label.
        node: String,
        /// Write failure.
        #[source]
        source: WriteError,
    },
}
