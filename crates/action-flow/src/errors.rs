//! Plan translation errors

use grid_compiler::Cell;
use thiserror::Error;
use wayfinder_core_types::StateId;

/// Raised when a solved path cannot be turned into a plan.
///
/// These indicate that the grid and the graph disagree, which is a bug in
/// whatever produced the grid rather than a condition of the live UI.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    /// Solver returned nothing
    #[error("solved path is empty")]
    EmptyPath,

    /// Consecutive states without a recorded transition
    #[error("no recorded transition from {from} to {to}")]
    MissingEdge { from: StateId, to: StateId },

    /// Path visits a state the graph does not know
    #[error("path visits unknown state {0}")]
    UnknownState(StateId),

    /// Path does not start or end on the requested states
    #[error("path runs from {start} to {end}, expected {expected_start} to {expected_end}")]
    WrongEndpoints {
        start: Cell,
        end: Cell,
        expected_start: Cell,
        expected_end: Cell,
    },
}

impl FlowError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
