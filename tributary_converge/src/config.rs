// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Convergence tuning and per-module overrides.

use serde::{Deserialize, Serialize};

/// Planner and executor tuning. Deserializes from the `[converge]` table of
/// a runtime configuration; missing keys keep their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Closure / total node ratio at or above which a full pass is chosen.
    pub near_full_ratio: f64,
    /// Execution budget advisory, in milliseconds.
    pub budget_ms: f64,
    /// Wall-time budget for one planner decision, in milliseconds. A
    /// decision over budget falls back to a full pass.
    ///
    /// Unset by default: the cutoff depends on the wall clock, so plans stop
    /// being reproducible once a budget is set.
    pub decision_budget_ms: Option<f64>,
    /// Plan cache entries kept per instance.
    pub plan_cache_capacity: usize,
    /// Allow the executor to defer the rest of a pass once over budget.
    pub time_slicing: bool,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            near_full_ratio: 0.9,
            budget_ms: 8.0,
            decision_budget_ms: None,
            plan_cache_capacity: 128,
            time_slicing: false,
        }
    }
}

impl ConvergeConfig {
    /// Applies the budget fields of `over`, if set.
    #[must_use]
    pub fn with_override(&self, over: &ModuleOverride) -> Self {
        Self {
            budget_ms: over.converge_budget_ms.unwrap_or(self.budget_ms),
            decision_budget_ms: over.decision_budget_ms.or(self.decision_budget_ms),
            ..self.clone()
        }
    }
}

/// Forced convergence mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergeMode {
    /// Let the planner decide.
    #[default]
    Auto,
    /// Always evaluate every node.
    Full,
    /// Always evaluate the affected closure, unless the dirty set is a
    /// sentinel.
    Dirty,
}

/// Explicit per-instance or per-provider convergence settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleOverride {
    /// Forced mode; `auto` or absent keeps the heuristics.
    pub converge_mode: Option<ConvergeMode>,
    /// Replaces [`ConvergeConfig::budget_ms`].
    pub converge_budget_ms: Option<f64>,
    /// Replaces [`ConvergeConfig::decision_budget_ms`].
    pub decision_budget_ms: Option<f64>,
}

impl ModuleOverride {
    /// The forced mode, if any (`auto` is not a force).
    #[must_use]
    pub fn forced_mode(&self) -> Option<ConvergeMode> {
        self.converge_mode.filter(|mode| *mode != ConvergeMode::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_budgets() {
        let base = ConvergeConfig::default();
        let over = ModuleOverride {
            converge_budget_ms: Some(2.0),
            ..ModuleOverride::default()
        };
        let merged = base.with_override(&over);
        assert_eq!(merged.budget_ms, 2.0);
        assert_eq!(merged.decision_budget_ms, None);
        assert_eq!(over.forced_mode(), None);

        let timed = ModuleOverride {
            decision_budget_ms: Some(0.25),
            ..ModuleOverride::default()
        };
        assert_eq!(base.with_override(&timed).decision_budget_ms, Some(0.25));
    }

    #[test]
    fn decision_budget_is_opt_in() {
        let config: ConvergeConfig = serde_json::from_str(r#"{ "budget_ms": 4.0 }"#).unwrap();
        assert_eq!(config.decision_budget_ms, None);

        let config: ConvergeConfig =
            serde_json::from_str(r#"{ "decision_budget_ms": 0.5 }"#).unwrap();
        assert_eq!(config.decision_budget_ms, Some(0.5));
    }

    #[test]
    fn override_wire_shape() {
        let over: ModuleOverride =
            serde_json::from_str(r#"{ "convergeMode": "full", "decisionBudgetMs": 1.5 }"#).unwrap();
        assert_eq!(over.forced_mode(), Some(ConvergeMode::Full));
        assert_eq!(over.decision_budget_ms, Some(1.5));

        let auto: ModuleOverride = serde_json::from_str(r#"{ "convergeMode": "auto" }"#).unwrap();
        assert_eq!(auto.forced_mode(), None);
    }
}
