use std::collections::{HashMap, VecDeque};

use grid_compiler::{Cell, TokenGrid};
use tracing::debug;

use crate::{Solver, SolverError};

/// Breadth-first reference solver. Neighbours are expanded up, down, left,
/// right, so equal-length paths always come out the same way.
#[derive(Clone, Copy, Debug, Default)]
pub struct BfsSolver;

impl Solver for BfsSolver {
    fn name(&self) -> &'static str {
        "bfs"
    }

    fn solve(&self, grid: &TokenGrid, start: Cell, target: Cell) -> Result<Vec<Cell>, SolverError> {
        for cell in [start, target] {
            if !grid.contains(cell) {
                return Err(SolverError::OutOfBounds(cell));
            }
            if !grid.is_passable(cell) {
                return Err(SolverError::Blocked(cell));
            }
        }

        let mut parents: HashMap<Cell, Cell> = HashMap::new();
        let mut visited = vec![false; grid.width() * grid.height()];
        let mut queue = VecDeque::from([start]);
        visited[start.row * grid.width() + start.col] = true;
        let mut expanded = 0usize;

        while let Some(cell) = queue.pop_front() {
            if cell == target {
                let mut path = vec![cell];
                let mut cursor = cell;
                while let Some(&parent) = parents.get(&cursor) {
                    path.push(parent);
                    cursor = parent;
                }
                path.reverse();
                debug!(target: "path-solver", expanded, length = path.len(), "path found");
                return Ok(path);
            }
            expanded += 1;
            for next in grid.neighbors(cell) {
                let slot = next.row * grid.width() + next.col;
                if visited[slot] || !grid.is_passable(next) {
                    continue;
                }
                visited[slot] = true;
                parents.insert(next, cell);
                queue.push_back(next);
            }
        }

        debug!(target: "path-solver", expanded, %start, %target, "target unreachable");
        Err(SolverError::Unreachable { start, target })
    }
}
