//! Workflow definitions.
//!
//! A workflow is a named, versioned DAG of step definitions. The step config
//! is a tagged union: each step type carries exactly the fields its
//! dispatcher needs, so an unknown or mismatched config fails at
//! deserialization instead of at dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::identity::{Handle, TeamName};

/// Discriminant of a step type, as stored on step rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Task,
    Spawn,
    Checkpoint,
    Gate,
    Parallel,
    Script,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Spawn => "spawn",
            Self::Checkpoint => "checkpoint",
            Self::Gate => "gate",
            Self::Parallel => "parallel",
            Self::Script => "script",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task" => Some(Self::Task),
            "spawn" => Some(Self::Spawn),
            "checkpoint" => Some(Self::Checkpoint),
            "gate" => Some(Self::Gate),
            "parallel" => Some(Self::Parallel),
            "script" => Some(Self::Script),
            _ => None,
        }
    }
}

/// Completion strategy for a `parallel` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStrategy {
    /// Complete when every watched step finishes.
    All,
    /// Complete when the first watched step completes; the rest are skipped.
    Any,
    /// Like `any`, but the losers are actively cancelled (skipped with a
    /// cancellation note and their late completions ignored).
    Race,
}

impl Default for ParallelStrategy {
    fn default() -> Self {
        Self::All
    }
}

/// Per-type step configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Materialize a team task for `assign_to`; the step completes when the
    /// task resolves.
    Task {
        assign_to: Handle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team: Option<TeamName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Enqueue a spawn request for `agent_role`; the spawned worker reports
    /// completion through the external `complete_step` hook.
    Spawn {
        agent_role: String,
        task: String,
    },
    /// Create a checkpoint addressed to `to_handle`.
    Checkpoint {
        to_handle: Handle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default)]
        wait_for_acceptance: bool,
    },
    /// Evaluate `condition` against the execution context and promote one
    /// branch, skipping the other.
    Gate {
        condition: String,
        #[serde(default)]
        on_true: Vec<String>,
        #[serde(default)]
        on_false: Vec<String>,
    },
    /// Promote `step_keys` together and complete per `strategy`.
    Parallel {
        step_keys: Vec<String>,
        #[serde(default)]
        strategy: ParallelStrategy,
    },
    /// Evaluate `script` and store the result as the step output.
    Script {
        script: String,
    },
}

impl StepConfig {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Task { .. } => StepType::Task,
            Self::Spawn { .. } => StepType::Spawn,
            Self::Checkpoint { .. } => StepType::Checkpoint,
            Self::Gate { .. } => StepType::Gate,
            Self::Parallel { .. } => StepType::Parallel,
            Self::Script { .. } => StepType::Script,
        }
    }
}

/// What happens when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Fail the execution (default).
    Fail,
    /// Mark the step skipped; dependents cascade as if it completed.
    Skip,
    /// Re-queue the step until `max_retries` is exhausted, then fail.
    Retry,
    /// Record the failure but let the execution continue.
    Continue,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::Fail
    }
}

impl OnFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Retry => "retry",
            Self::Continue => "continue",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fail" => Some(Self::Fail),
            "skip" => Some(Self::Skip),
            "retry" => Some(Self::Retry),
            "continue" => Some(Self::Continue),
            _ => None,
        }
    }
}

/// One step in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    /// Unique within the workflow.
    pub key: String,
    pub name: String,
    #[serde(flatten)]
    pub config: StepConfig,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Guard expression; evaluating to false skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StepDef {
    pub fn new(key: impl Into<String>, name: impl Into<String>, config: StepConfig) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            config,
            depends_on: BTreeSet::new(),
            guard: None,
            on_failure: OnFailure::Fail,
            max_retries: 0,
            timeout_ms: None,
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = &'static str>) -> Self {
        self.depends_on = deps.into_iter().map(String::from).collect();
        self
    }

    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure, max_retries: u32) -> Self {
        self.on_failure = on_failure;
        self.max_retries = max_retries;
        self
    }
}

/// Declared workflow input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDef {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// The executable body of a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WorkflowDefinition {
    /// Structural validation: step keys unique, dependencies resolvable,
    /// gate/parallel targets resolvable.
    pub fn validate(&self) -> DomainResult<()> {
        let mut keys = BTreeSet::new();
        for step in &self.steps {
            if !keys.insert(step.key.as_str()) {
                return Err(DomainError::Validation(format!(
                    "duplicate step key: {}",
                    step.key
                )));
            }
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if !keys.contains(dep.as_str()) {
                    return Err(DomainError::Validation(format!(
                        "step {} depends on unknown step {}",
                        step.key, dep
                    )));
                }
            }
            match &step.config {
                StepConfig::Gate { on_true, on_false, .. } => {
                    for key in on_true.iter().chain(on_false) {
                        if !keys.contains(key.as_str()) {
                            return Err(DomainError::Validation(format!(
                                "gate {} branches to unknown step {}",
                                step.key, key
                            )));
                        }
                        // A branch target must wait for the gate, or it
                        // would be promoted at execution start and run
                        // before the gate evaluates.
                        let waits_for_gate = self
                            .steps
                            .iter()
                            .find(|s| s.key == *key)
                            .is_some_and(|s| s.depends_on.contains(&step.key));
                        if !waits_for_gate {
                            return Err(DomainError::Validation(format!(
                                "gate {} branch target {} must depend on {}",
                                step.key, key, step.key
                            )));
                        }
                    }
                }
                StepConfig::Parallel { step_keys, .. } => {
                    for key in step_keys {
                        if !keys.contains(key.as_str()) {
                            return Err(DomainError::Validation(format!(
                                "parallel {} watches unknown step {}",
                                step.key, key
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn step(&self, key: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.key == key)
    }
}

/// A named, versioned workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub definition: WorkflowDefinition,
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, definition: WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            definition,
            is_template: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_step(key: &str) -> StepDef {
        StepDef::new(key, key, StepConfig::Script { script: "1".into() })
    }

    #[test]
    fn validate_rejects_duplicate_keys() {
        let def = WorkflowDefinition {
            steps: vec![script_step("a"), script_step("a")],
            ..Default::default()
        };
        assert!(matches!(def.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn validate_rejects_unknown_dependency() {
        let mut step = script_step("a");
        step.depends_on.insert("missing".into());
        let def = WorkflowDefinition { steps: vec![step], ..Default::default() };
        assert!(matches!(def.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn validate_requires_gate_branches_to_depend_on_the_gate() {
        let gate = StepDef::new(
            "gate",
            "gate",
            StepConfig::Gate {
                condition: "true".into(),
                on_true: vec!["yes".into()],
                on_false: vec![],
            },
        );

        // A branch target without the gate dependency would run at start.
        let def = WorkflowDefinition {
            steps: vec![gate.clone(), script_step("yes")],
            ..Default::default()
        };
        assert!(matches!(def.validate(), Err(DomainError::Validation(_))));

        let def = WorkflowDefinition {
            steps: vec![gate, script_step("yes").depends_on(["gate"])],
            ..Default::default()
        };
        assert!(def.validate().is_ok());
    }

    #[test]
    fn step_config_round_trips_as_tagged_json() {
        let config = StepConfig::Gate {
            condition: "steps.prep.output.ok".into(),
            on_true: vec!["yes".into()],
            on_false: vec!["no".into()],
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "gate");
        let back: StepConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
