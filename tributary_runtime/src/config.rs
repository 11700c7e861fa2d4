// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime configuration.
//!
//! ```toml
//! diagnostics = "light"
//!
//! [scheduler]
//! max_steps = 64
//! urgent_step_cap = 512
//! max_drain_rounds = 8
//!
//! [converge]
//! near_full_ratio = 0.9
//! budget_ms = 8.0
//!
//! [tasks]
//! parallel_cap = 16
//! ```

use serde::{Deserialize, Serialize};
use tributary_converge::ConvergeConfig;

use crate::error::ConfigError;
use crate::evidence::DiagnosticsLevel;

/// Whole runtime configuration. Every table and key is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Evidence gating.
    pub diagnostics: DiagnosticsLevel,
    /// Drain loop caps.
    pub scheduler: SchedulerConfig,
    /// Planner and executor tuning.
    pub converge: ConvergeConfig,
    /// Task runner defaults.
    pub tasks: TaskConfig,
}

impl RuntimeConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Caps of one `flush_now` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Topics per drain round.
    pub max_steps: usize,
    /// Topics per round when only urgent topics are pending.
    pub urgent_step_cap: usize,
    /// Rounds per flush before leftovers roll over to the next tick.
    pub max_drain_rounds: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_steps: 64,
            urgent_step_cap: 512,
            max_drain_rounds: 8,
        }
    }
}

/// Task runner defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Concurrency cap of the `parallel` policy when a call site sets none.
    pub parallel_cap: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { parallel_cap: 16 }
    }
}
