use serde::Serialize;
use wayfinder_core_types::{Action, Selector, StateId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorerPhase {
    Idle,
    Exploring,
    Backtracking,
    Done,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExplorerEvent {
    PhaseChanged {
        phase: ExplorerPhase,
    },
    StateDiscovered {
        state: StateId,
        label: String,
        depth: usize,
    },
    EdgeRecorded {
        from: StateId,
        to: StateId,
        action: Action,
        observed_count: u32,
    },
    ProbeFailed {
        state: StateId,
        selector: Selector,
        reason: String,
    },
}

/// Counters for one exploration run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExplorationReport {
    pub states_discovered: usize,
    pub edges_observed: usize,
    pub probes: usize,
    pub failed_probes: usize,
    pub cancelled: bool,
    /// Set when the run lost its way and could not navigate back.
    pub lost: bool,
    pub complete: bool,
}
