//! Core types for plan execution

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfinder_core_types::{Action, Fingerprint, StateId};

/// One executable step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Zero-based position in the plan
    pub index: usize,

    /// State the step starts from, when known
    pub from: Option<StateId>,

    /// State the step should land on; unchecked when absent
    pub expected: Option<StateId>,

    pub action: Action,

    /// Per-step override of the runner's action timeout
    #[serde(default, skip_serializing_if = "Option::is_none", with = "millis")]
    pub timeout: Option<Duration>,

    /// Human readable summary
    #[serde(default)]
    pub description: String,
}

impl PlanStep {
    pub fn new(index: usize, action: Action) -> Self {
        Self {
            index,
            from: None,
            expected: None,
            description: action.to_string(),
            action,
            timeout: None,
        }
    }

    pub fn expecting(mut self, from: StateId, to: StateId) -> Self {
        self.from = Some(from);
        self.expected = Some(to);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Ordered list of actions translated from a solved path. Consumed once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// States the plan walks through, start and goal included
    pub states: Vec<StateId>,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn from_steps(steps: Vec<PlanStep>) -> Self {
        Self {
            states: Vec::new(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Progress report emitted after every executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step_index: usize,
    pub success: bool,
    pub new_fingerprint: Option<Fingerprint>,
    pub error: Option<String>,
}

/// How a plan run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step executed and matched its expected state
    Completed { steps: usize, final_state: Option<Fingerprint> },

    /// A step could not be executed after its retries
    Failed {
        step_index: usize,
        last_successful_step: Option<usize>,
        error: String,
    },

    /// A step executed but landed somewhere unexpected
    Diverged {
        step_index: usize,
        expected: StateId,
        observed: Fingerprint,
    },

    /// Stopped on request; executed steps are not rolled back
    Cancelled { completed: usize },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Completed { steps, .. } => format!("completed {steps} steps"),
            RunOutcome::Failed {
                step_index, error, ..
            } => format!("step {step_index} failed: {error}"),
            RunOutcome::Diverged {
                step_index,
                expected,
                observed,
            } => format!(
                "step {step_index} expected {} but observed {}",
                expected.short(),
                observed.short()
            ),
            RunOutcome::Cancelled { completed } => format!("cancelled after {completed} steps"),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
