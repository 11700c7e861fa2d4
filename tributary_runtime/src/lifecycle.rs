// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instance lifecycle: init effects, error handlers, teardown.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::error::LifecycleError;

/// Async effect run once, for init or teardown.
pub type Effect = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// Receives lifecycle failures. A failing handler is logged and skipped.
pub type ErrorHandler = Arc<dyn Fn(&LifecycleError) -> Result<(), String> + Send + Sync>;

/// Progress of the init effects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitProgress {
    /// Registered init effects.
    pub total: usize,
    /// Finished init effects.
    pub completed: usize,
    /// Name of the running effect.
    pub current: Option<String>,
    /// Unix time in milliseconds when init started.
    pub started_at: Option<u64>,
}

/// Lifecycle status of an instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LifecycleStatus {
    /// Init effects are pending or running.
    Initializing {
        /// How far init got.
        init_progress: InitProgress,
    },
    /// Ready for use.
    Ready,
}

/// Registered lifecycle hooks of one instance.
#[derive(Default)]
pub struct Lifecycle {
    init: Vec<(String, Effect)>,
    destroy: Vec<Effect>,
    handlers: Vec<ErrorHandler>,
    progress: InitProgress,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("pending_init", &self.init.len())
            .field("destroy", &self.destroy.len())
            .field("handlers", &self.handlers.len())
            .field("progress", &self.progress)
            .finish()
    }
}

impl Lifecycle {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `effect` at teardown. Effects run in reverse registration
    /// order.
    pub fn register_destroy<F, Fut>(&mut self, effect: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.destroy.push(Box::new(move || effect().boxed()));
    }

    /// Adds an error handler.
    pub fn register_on_error(
        &mut self,
        handler: impl Fn(&LifecycleError) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.handlers.push(Arc::new(handler));
    }

    /// Adds an effect that must finish before the instance is ready.
    pub fn register_init_required<F, Fut>(&mut self, name: impl Into<String>, effect: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.init.push((name.into(), Box::new(move || effect().boxed())));
        self.progress.total += 1;
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> LifecycleStatus {
        if self.progress.completed < self.progress.total {
            LifecycleStatus::Initializing {
                init_progress: self.progress.clone(),
            }
        } else {
            LifecycleStatus::Ready
        }
    }

    /// Runs the pending init effects in registration order. Stops at the
    /// first failure, which is also reported to the error handlers.
    pub async fn run_init(&mut self) -> Result<(), LifecycleError> {
        if self.init.is_empty() {
            return Ok(());
        }
        self.progress.started_at.get_or_insert_with(unix_millis);
        for (name, effect) in std::mem::take(&mut self.init) {
            self.progress.current = Some(name.clone());
            let outcome = AssertUnwindSafe(effect()).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(message)) => Some(message),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(message) = failure {
                let err = LifecycleError::InitFailed {
                    effect: name,
                    message,
                };
                self.report(&err);
                return Err(err);
            }
            self.progress.completed += 1;
        }
        self.progress.current = None;
        Ok(())
    }

    /// Notifies every error handler. Handler failures and panics are
    /// logged, never propagated.
    pub fn report(&self, error: &LifecycleError) {
        for handler in &self.handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(error))) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    tracing::warn!(error = %error, handler_error = %message, "error handler failed");
                }
                Err(panic) => {
                    tracing::warn!(
                        error = %error,
                        panic = %panic_message(panic.as_ref()),
                        "error handler panicked"
                    );
                }
            }
        }
    }

    /// Runs destroy effects, then reports each interrupted task to the
    /// error handlers. Always completes.
    ///
    /// Returns the failures seen along the way.
    pub async fn teardown(&mut self, interrupted: Vec<String>) -> Vec<LifecycleError> {
        let mut failures = Vec::new();
        while let Some(effect) = self.destroy.pop() {
            let message = match AssertUnwindSafe(effect()).catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(message)) => message,
                Err(panic) => panic_message(panic.as_ref()),
            };
            tracing::warn!(error = %message, "destroy effect failed");
            failures.push(LifecycleError::DestroyFailed(message));
        }
        for task in interrupted {
            let err = LifecycleError::Interrupted(task);
            self.report(&err);
            failures.push(err);
        }
        failures
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_owned()
    }
}
