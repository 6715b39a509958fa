use thiserror::Error;
use wayfinder_core_types::StateId;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown state: {0}")]
    UnknownState(StateId),
    #[error("goal {0:?} does not match any known state")]
    GoalNotFound(String),
    #[error("goal {goal:?} matches {} states: {}", candidates.len(), candidates.join(", "))]
    AmbiguousGoal { goal: String, candidates: Vec<String> },
    #[error("snapshot lists state {0} twice")]
    DuplicateState(StateId),
    #[error("snapshot edge {from} -> {to} references an unknown state")]
    DanglingEdge { from: StateId, to: StateId },
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl GraphError {
    /// Caller can pick another goal or re-explore.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::UnknownState(_) | GraphError::GoalNotFound(_) | GraphError::AmbiguousGoal { .. }
        )
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
