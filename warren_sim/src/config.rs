// Data-driven game configuration.
//
// All tunable simulation parameters live in `GameConfig`, loaded from JSON
// at startup. The sim reads every constant it uses from here: navigation
// budgets (`NavConfig`), planner limits, need drift, execution retry and
// movement timing, and a per-task tuning table keyed by `TaskKind` (the
// same data-table approach as per-species data: one code path, behavior
// differences expressed as numbers).
//
// Every struct is `#[serde(default)]`, so a JSON file only needs the values
// it changes.
//
// See also: `task.rs` which reads `TaskTuning`, `planner.rs` for
// `PlannerConfig`, `character.rs` for needs and execution, `warren_nav`'s
// `config.rs` for `NavConfig`.
//
// **Critical constraint: determinism.** Config values feed straight into
// planning scores and movement timing; every client must load the same
// values.

use crate::error::Result;
use crate::types::TaskKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warren_nav::NavConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Longest task chain the planner looks ahead over.
    pub max_depth: u32,
    /// Floor on any task's duration in ticks, so utility/time stays finite.
    pub min_task_time: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_task_time: 1.0,
        }
    }
}

/// How fast needs grow. Needs run from 0 (satisfied) to `max_need`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedConfig {
    pub hunger_per_tick: f32,
    pub fatigue_per_tick: f32,
    pub loneliness_per_tick: f32,
    pub max_need: f32,
}

impl Default for NeedConfig {
    fn default() -> Self {
        Self {
            hunger_per_tick: 0.004,
            fatigue_per_tick: 0.003,
            loneliness_per_tick: 0.005,
            max_need: 10.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Failures a task absorbs (re-resolving its target and rebuilding its
    /// actions) before it is replaced by the wait task.
    pub max_retries: u32,
    /// Ticks to cross one tile at speed 1.
    pub ticks_per_tile: f32,
    /// Route requests one travel action makes before it gives up.
    pub max_route_requests: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            ticks_per_tile: 4.0,
            max_route_requests: 3,
        }
    }
}

/// Per-task numbers. Utility is `weight` times whatever need the task
/// serves (or `weight` alone for tasks that serve none).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskTuning {
    pub weight: f32,
    /// Ticks spent doing the task once at the target.
    pub duration: f32,
    pub success_probability: f32,
    /// Utility credited when a risky task fails.
    pub failure_utility: f32,
}

impl TaskTuning {
    const fn certain(weight: f32, duration: f32) -> Self {
        Self {
            weight,
            duration,
            success_probability: 1.0,
            failure_utility: 0.0,
        }
    }

    /// Shipped values for a task kind.
    pub fn default_for(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Wait => Self::certain(1.0, 30.0),
            TaskKind::FetchFood => Self::certain(0.5, 20.0),
            TaskKind::Eat => Self::certain(10.0, 40.0),
            TaskKind::Sleep => Self::certain(12.0, 300.0),
            TaskKind::Sit => Self::certain(3.0, 60.0),
            TaskKind::Chat => Self {
                weight: 6.0,
                duration: 80.0,
                success_probability: 0.7,
                failure_utility: 0.0,
            },
            TaskKind::Farewell => Self::certain(1.0, 10.0),
            TaskKind::Directive => Self::certain(50.0, 30.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub nav: NavConfig,
    pub planner: PlannerConfig,
    pub needs: NeedConfig,
    pub execution: ExecutionConfig,
    pub tasks: BTreeMap<TaskKind, TaskTuning>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            nav: NavConfig::default(),
            planner: PlannerConfig::default(),
            needs: NeedConfig::default(),
            execution: ExecutionConfig::default(),
            tasks: TaskKind::ALL
                .into_iter()
                .map(|kind| (kind, TaskTuning::default_for(kind)))
                .collect(),
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Tuning for `kind`, falling back to the shipped values when the table
    /// has no entry.
    pub fn tuning(&self, kind: TaskKind) -> TaskTuning {
        self.tasks
            .get(&kind)
            .copied()
            .unwrap_or_else(|| TaskTuning::default_for(kind))
    }
}
