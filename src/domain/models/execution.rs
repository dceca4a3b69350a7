//! Execution and step runtime state.
//!
//! An execution is one run of a workflow; its steps are materialized rows
//! carrying the Kahn-style ready-set bookkeeping (`blocked_by_count`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::identity::SwarmId;
use crate::domain::models::workflow::{OnFailure, StepConfig, StepDef, StepType};

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub swarm_id: Option<SwarmId>,
    pub status: ExecutionStatus,
    /// Accumulated context: `inputs`, `trigger`, and anything steps write.
    pub context: serde_json::Value,
    pub error: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(workflow_id: Uuid, created_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            swarm_id: None,
            status: ExecutionStatus::Pending,
            context: serde_json::json!({}),
            error: None,
            created_by: created_by.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Status of a materialized step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Dependencies outstanding.
    Pending,
    /// Eligible for dispatch.
    Ready,
    /// Dispatched; waiting on completion.
    Running,
    Completed,
    Failed,
    Skipped,
    /// Parked by a failed dependency.
    Blocked,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether dependents treat this status as satisfied for the cascade.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// A materialized step of an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_key: String,
    pub step_type: StepType,
    pub status: StepStatus,
    pub config: StepConfig,
    pub depends_on: BTreeSet<String>,
    /// Number of dependencies not yet in `{completed, skipped}`.
    pub blocked_by_count: u32,
    pub guard: Option<String>,
    pub on_failure: OnFailure,
    pub output: Option<serde_json::Value>,
    pub assigned_to: Option<String>,
    /// ID of the external record driving this step: a task, spawn request,
    /// or checkpoint.
    pub external_ref: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Materialize a step from its definition. Steps start `pending` with
    /// `blocked_by_count = |depends_on|`; the engine promotes zero-dep steps
    /// in the same unit that creates them.
    pub fn materialize(execution_id: Uuid, def: &StepDef) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_key: def.key.clone(),
            step_type: def.config.step_type(),
            status: StepStatus::Pending,
            config: def.config.clone(),
            depends_on: def.depends_on.clone(),
            blocked_by_count: def.depends_on.len() as u32,
            guard: def.guard.clone(),
            on_failure: def.on_failure,
            output: None,
            assigned_to: None,
            external_ref: None,
            error: None,
            retry_count: 0,
            max_retries: def.max_retries,
            timeout_ms: def.timeout_ms,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Whether the step is eligible for dispatch.
    pub fn is_eligible(&self) -> bool {
        self.status == StepStatus::Ready && self.blocked_by_count == 0
    }

    /// Whether a running step has outlived its timeout at `now`.
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.started_at, self.timeout_ms) {
            (StepStatus::Running, Some(started), Some(timeout_ms)) => {
                (now - started).num_milliseconds() > timeout_ms as i64
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::workflow::StepDef;

    #[test]
    fn materialized_step_counts_dependencies() {
        let def = StepDef::new("c", "c", StepConfig::Script { script: "1".into() })
            .depends_on(["a", "b"]);
        let step = Step::materialize(Uuid::new_v4(), &def);
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.blocked_by_count, 2);
        assert!(!step.is_eligible());
    }

    #[test]
    fn timeout_requires_running_and_started() {
        let def = StepDef::new("a", "a", StepConfig::Script { script: "1".into() });
        let mut step = Step::materialize(Uuid::new_v4(), &def);
        step.timeout_ms = Some(10);
        assert!(!step.timed_out(Utc::now()));
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(step.timed_out(Utc::now()));
    }
}
