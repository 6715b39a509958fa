//! Solver contract: token grid + start + target -> ordered cells.
//!
//! Anything that honours [`Solver`] (A*, a learned model emitting the same
//! coordinate sequence) can replace [`BfsSolver`] without touching grid
//! compilation or plan translation.

mod bfs;

pub use bfs::BfsSolver;

use grid_compiler::{Cell, TokenGrid};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("no path from {start} to {target}")]
    Unreachable { start: Cell, target: Cell },
    #[error("cell {0} is outside the grid")]
    OutOfBounds(Cell),
    #[error("cell {0} is a wall")]
    Blocked(Cell),
}

impl SolverError {
    /// A solver answer never changes without a new grid.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Path from `start` to `target` inclusive, each step 4-adjacent.
    fn solve(&self, grid: &TokenGrid, start: Cell, target: Cell) -> Result<Vec<Cell>, SolverError>;
}
