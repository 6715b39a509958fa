use thiserror::Error;
use wayfinder_core_types::StateId;

use crate::grid::Cell;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("grid of {width}x{height} needs {expected} tokens, got {actual}")]
    InvalidShape {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
    #[error("unknown grid token {0}")]
    InvalidToken(u8),
    #[error("grid must hold exactly one {token} marker, found {count}")]
    MarkerCount { token: &'static str, count: usize },
    #[error("cell {0} is outside the grid")]
    OutOfBounds(Cell),
    #[error("state {0} is not in the graph")]
    UnknownState(StateId),
}
