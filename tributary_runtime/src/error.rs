// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime error types.

use thiserror::Error;
use tributary_converge::{BuildError, ConvergeError, PathParseError, WriteError};

use crate::queue::Topic;

/// A reducer could not apply an action to its draft.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DraftError {
    /// The reducer named a malformed path.
    #[error(transparent)]
    Path(#[from] PathParseError),
    /// The write does not fit the state tree.
    #[error(transparent)]
    Write(#[from] WriteError),
    /// The reducer refused the action.
    #[error("{0}")]
    Rejected(String),
}

impl DraftError {
    /// A refusal with a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// A dispatch was refused. The instance state is unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No instance is registered under the topic.
    #[error("unknown topic `{0}`")]
    UnknownTopic(Topic),
    /// The instance is being torn down.
    #[error("instance `{0}` is closed")]
    InstanceClosed(Topic),
    /// The module has no reducer for the action type.
    #[error("module `{module}` has no reducer for action `{kind}`")]
    UnknownAction {
        /// Module id.
        module: String,
        /// Action type.
        kind: String,
    },
    /// The reducer failed; the transaction's sequence number stays consumed.
    #[error("transaction {txn_seq} (`{kind}`) failed: {source}")]
    Reducer {
        /// Consumed sequence number.
        txn_seq: u64,
        /// Action type.
        kind: String,
        /// Reducer failure.
        #[source]
        source: DraftError,
    },
    /// `dispatch_batch` with no actions.
    #[error("empty batch")]
    EmptyBatch,
}

/// Failures observed by an instance's lifecycle.
///
/// These are reported to registered error handlers. Teardown never stops
/// because of them.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A transaction failed to converge and was rolled back.
    #[error("transaction {txn_seq} did not converge: {source}")]
    Converge {
        /// Sequence number of the rolled back transaction.
        txn_seq: u64,
        /// Cause.
        #[source]
        source: ConvergeError,
    },
    /// An init effect failed.
    #[error("init effect `{effect}` failed: {message}")]
    InitFailed {
        /// Effect name.
        effect: String,
        /// Reported failure.
        message: String,
    },
    /// A destroy effect failed or panicked.
    #[error("destroy effect failed: {0}")]
    DestroyFailed(String),
    /// A task was interrupted by teardown.
    #[error("task `{0}` was interrupted")]
    Interrupted(String),
    /// An error handler failed or panicked.
    #[error("error handler failed: {0}")]
    HandlerFailed(String),
}

/// Errors from the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML could not be parsed into a configuration.
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level runtime failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A module's trait declarations do not compile.
    #[error("module `{module}` is malformed: {source}")]
    Build {
        /// Module id.
        module: String,
        /// Cause.
        #[source]
        source: BuildError,
    },
    /// See [`DispatchError`].
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// See [`LifecycleError`].
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The initial derivation of a new instance failed.
    #[error("instance `{topic}` could not derive its initial state: {source}")]
    InitialState {
        /// The new instance.
        topic: Topic,
        /// Cause.
        #[source]
        source: ConvergeError,
    },
    /// The runtime driver has stopped.
    #[error("the runtime has shut down")]
    Closed,
}
