//! Graph to grid projection.
//!
//! Nodes sit on every other cell of a k x k lattice (k = ceil(sqrt(n))) in
//! discovery order, so two placed nodes are never 4-adjacent and a walkable
//! step never jumps straight between unrelated states. Every edge then gets
//! an L-shaped corridor between its endpoints. Corridors are only a
//! reachability aid: where two of them cross, the solver may see a shortcut
//! that no recorded edge backs.

use std::collections::HashMap;

use nav_graph::NavGraph;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wayfinder_core_types::StateId;

use crate::errors::GridError;
use crate::grid::{Cell, TokenGrid};
use crate::token::Token;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Wall cells added after the last lattice row and column.
    pub padding: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { padding: 2 }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GridCompiler {
    config: GridConfig,
}

/// A compiled grid plus both coordinate indices.
#[derive(Clone, Debug)]
pub struct CompiledGrid {
    grid: TokenGrid,
    positions: HashMap<StateId, Cell>,
    states: HashMap<Cell, StateId>,
    labels: HashMap<Cell, char>,
    start: Cell,
    target: Cell,
}

impl GridCompiler {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn compile(
        &self,
        graph: &NavGraph,
        current: &StateId,
        target: &StateId,
    ) -> Result<CompiledGrid, GridError> {
        for id in [current, target] {
            if !graph.contains(id) {
                return Err(GridError::UnknownState(id.clone()));
            }
        }
        if current == target {
            return Ok(Self::degenerate(graph, current));
        }

        let n = graph.node_count();
        let k = lattice_side(n);
        let side = 2 * k - 1 + self.config.padding;
        let mut grid = TokenGrid::walls(side, side);
        let mut compiled = CompiledGrid {
            grid: TokenGrid::walls(1, 1),
            positions: HashMap::with_capacity(n),
            states: HashMap::with_capacity(n),
            labels: HashMap::with_capacity(n),
            start: Cell::new(0, 0),
            target: Cell::new(0, 0),
        };

        for (idx, node) in graph.nodes().enumerate() {
            let cell = Cell::new(2 * (idx / k), 2 * (idx % k));
            grid.set(cell, Token::Walkable);
            compiled.positions.insert(node.id.clone(), cell);
            compiled.states.insert(cell, node.id.clone());
            if let Some(letter) = node.label.chars().find(|c| c.is_alphanumeric()) {
                compiled.labels.insert(cell, letter.to_ascii_uppercase());
            }
        }

        let mut corridors = 0usize;
        for edge in graph.edges() {
            let (Some(&from), Some(&to)) = (
                compiled.positions.get(&edge.from),
                compiled.positions.get(&edge.to),
            ) else {
                continue;
            };
            if from == to || from.is_adjacent(&to) {
                continue;
            }
            for cell in compiled.corridor(from, to, side) {
                if grid.get(cell) == Some(Token::Wall) {
                    grid.set(cell, Token::Walkable);
                }
            }
            corridors += 1;
        }

        compiled.start = compiled.positions[current];
        compiled.target = compiled.positions[target];
        grid.set(compiled.start, Token::Start);
        grid.set(compiled.target, Token::Target);
        compiled.grid = grid;

        debug!(
            target: "grid-compiler",
            nodes = n,
            side,
            corridors,
            start = %compiled.start,
            target = %compiled.target,
            "grid compiled"
        );
        Ok(compiled)
    }

    fn degenerate(graph: &NavGraph, state: &StateId) -> CompiledGrid {
        let cell = Cell::new(0, 0);
        let mut grid = TokenGrid::walls(1, 1);
        grid.set(cell, Token::Start);
        let labels = graph
            .node(state)
            .and_then(|node| node.label.chars().find(|c| c.is_alphanumeric()))
            .map(|c| HashMap::from([(cell, c.to_ascii_uppercase())]))
            .unwrap_or_default();
        CompiledGrid {
            grid,
            positions: HashMap::from([(state.clone(), cell)]),
            states: HashMap::from([(cell, state.clone())]),
            labels,
            start: cell,
            target: cell,
        }
    }
}

impl CompiledGrid {
    pub fn grid(&self) -> &TokenGrid {
        &self.grid
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    pub fn target(&self) -> Cell {
        self.target
    }

    pub fn position_of(&self, state: &StateId) -> Option<Cell> {
        self.positions.get(state).copied()
    }

    pub fn state_at(&self, cell: Cell) -> Option<&StateId> {
        self.states.get(&cell)
    }

    pub fn placed(&self) -> usize {
        self.positions.len()
    }

    /// States touched by `path`, in order, with repeats collapsed.
    pub fn states_along(&self, path: &[Cell]) -> Vec<StateId> {
        let mut states: Vec<StateId> = Vec::new();
        for state in path.iter().filter_map(|cell| self.state_at(*cell)) {
            if states.last() != Some(state) {
                states.push(state.clone());
            }
        }
        states
    }

    /// Text picture of the grid; `path` cells are drawn with `*`.
    pub fn render(&self, path: Option<&[Cell]>) -> String {
        let tokens = self.grid.overlay(path.unwrap_or_default());
        let width = self.grid.width();
        let mut out = String::with_capacity(tokens.len() + self.grid.height());
        for (idx, raw) in tokens.iter().enumerate() {
            let cell = Cell::new(idx / width, idx % width);
            let token = Token::from_u8(*raw).unwrap_or(Token::Wall);
            let glyph = match token {
                Token::Start | Token::Target => token.glyph(),
                _ => self.labels.get(&cell).copied().unwrap_or(token.glyph()),
            };
            out.push(glyph);
            if cell.col + 1 == width {
                out.push('\n');
            }
        }
        out
    }

    /// Horizontal-first L, else vertical-first, else a detour along the odd
    /// gutter row and column, whichever first avoids other node cells.
    fn corridor(&self, from: Cell, to: Cell, side: usize) -> Vec<Cell> {
        let horizontal = trace(&[from, Cell::new(from.row, to.col), to]);
        if !self.crosses_other_nodes(&horizontal, from, to) {
            return horizontal;
        }
        let vertical = trace(&[from, Cell::new(to.row, from.col), to]);
        if !self.crosses_other_nodes(&vertical, from, to) {
            return vertical;
        }
        let gutter_row = from.row + 1;
        let gutter_col = to.col + 1;
        if gutter_row < side && gutter_col < side {
            let detour = trace(&[
                from,
                Cell::new(gutter_row, from.col),
                Cell::new(gutter_row, gutter_col),
                Cell::new(to.row, gutter_col),
                to,
            ]);
            if !self.crosses_other_nodes(&detour, from, to) {
                return detour;
            }
        }
        horizontal
    }

    fn crosses_other_nodes(&self, cells: &[Cell], from: Cell, to: Cell) -> bool {
        cells
            .iter()
            .any(|cell| *cell != from && *cell != to && self.states.contains_key(cell))
    }
}

/// Smallest k with k * k >= n.
fn lattice_side(n: usize) -> usize {
    let mut k = 1;
    while k * k < n {
        k += 1;
    }
    k
}

/// All cells along a polyline of axis-aligned segments.
fn trace(points: &[Cell]) -> Vec<Cell> {
    let mut cells = Vec::new();
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.row == b.row {
            for col in span(a.col, b.col) {
                cells.push(Cell::new(a.row, col));
            }
        } else {
            for row in span(a.row, b.row) {
                cells.push(Cell::new(row, a.col));
            }
        }
    }
    cells.dedup();
    cells
}

fn span(a: usize, b: usize) -> Box<dyn Iterator<Item = usize>> {
    if a <= b {
        Box::new(a..=b)
    } else {
        Box::new((b..=a).rev())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_graph::StateNode;
    use wayfinder_core_types::{Action, Selector};

    fn id(value: &str) -> StateId {
        StateId::new(value)
    }

    fn graph(names: &[&str], edges: &[(&str, &str)]) -> NavGraph {
        let mut graph = NavGraph::new();
        for name in names {
            graph.upsert_node(StateNode::new(id(name), *name));
        }
        for (from, to) in edges {
            graph
                .record_edge(&id(from), &id(to), Action::tap(Selector::by_id(*to)))
                .unwrap();
        }
        graph
    }

    fn shop() -> NavGraph {
        graph(
            &["login", "dashboard", "orders"],
            &[("login", "dashboard"), ("dashboard", "orders")],
        )
    }

    #[test]
    fn places_nodes_on_spaced_lattice() {
        let compiled = GridCompiler::default()
            .compile(&shop(), &id("login"), &id("orders"))
            .unwrap();
        assert_eq!(compiled.position_of(&id("login")), Some(Cell::new(0, 0)));
        assert_eq!(compiled.position_of(&id("dashboard")), Some(Cell::new(0, 2)));
        assert_eq!(compiled.position_of(&id("orders")), Some(Cell::new(2, 0)));
        assert_eq!(compiled.grid().width(), 5);
        assert_eq!(compiled.grid().get(compiled.start()), Some(Token::Start));
        assert_eq!(compiled.grid().get(compiled.target()), Some(Token::Target));
        assert_eq!(compiled.start(), Cell::new(0, 0));
        assert_eq!(compiled.target(), Cell::new(2, 0));
    }

    #[test]
    fn indices_invert_each_other() {
        let names: Vec<String> = (0..11).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let graph = graph(&refs, &[("s0", "s10"), ("s3", "s7")]);
        let compiled = GridCompiler::default()
            .compile(&graph, &id("s0"), &id("s10"))
            .unwrap();
        assert_eq!(compiled.placed(), 11);
        for node in graph.nodes() {
            let cell = compiled.position_of(&node.id).unwrap();
            assert_eq!(compiled.state_at(cell), Some(&node.id));
        }
        let (start, target) = compiled.grid().markers().unwrap();
        assert_eq!((start, target), (compiled.start(), compiled.target()));
    }

    #[test]
    fn corridor_avoids_third_node_when_possible() {
        let compiled = GridCompiler::default()
            .compile(&shop(), &id("login"), &id("orders"))
            .unwrap();
        // dashboard -> orders: the horizontal-first elbow would run through
        // login at (0, 0), so the vertical-first elbow is used.
        assert_eq!(compiled.grid().get(Cell::new(1, 2)), Some(Token::Walkable));
        assert_eq!(compiled.grid().get(Cell::new(2, 1)), Some(Token::Walkable));
        assert_eq!(compiled.grid().get(Cell::new(0, 1)), Some(Token::Walkable));
        assert_eq!(compiled.grid().get(Cell::new(1, 0)), Some(Token::Wall));
    }

    #[test]
    fn same_state_gives_single_cell_grid() {
        let compiled = GridCompiler::default()
            .compile(&shop(), &id("orders"), &id("orders"))
            .unwrap();
        assert_eq!(compiled.grid().width(), 1);
        assert_eq!(compiled.grid().height(), 1);
        assert_eq!(compiled.start(), compiled.target());
        assert_eq!(compiled.state_at(Cell::new(0, 0)), Some(&id("orders")));
    }

    #[test]
    fn unknown_states_are_rejected() {
        let err = GridCompiler::default()
            .compile(&shop(), &id("login"), &id("settings"))
            .unwrap_err();
        assert_eq!(err, GridError::UnknownState(id("settings")));
    }

    #[test]
    fn render_marks_nodes_and_path() {
        let compiled = GridCompiler::default()
            .compile(&shop(), &id("login"), &id("orders"))
            .unwrap();
        let path = [
            Cell::new(0, 0),
            Cell::new(0, 1),
            Cell::new(0, 2),
            Cell::new(1, 2),
            Cell::new(2, 2),
            Cell::new(2, 1),
            Cell::new(2, 0),
        ];
        let picture = compiled.render(Some(&path));
        let rows: Vec<&str> = picture.lines().collect();
        assert_eq!(rows[0], "S*D##");
        assert_eq!(rows[1], "##*##");
        assert_eq!(rows[2], "T**##");
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn states_along_drops_corridor_cells() {
        let compiled = GridCompiler::default()
            .compile(&shop(), &id("login"), &id("orders"))
            .unwrap();
        let path = [Cell::new(0, 0), Cell::new(0, 1), Cell::new(0, 2), Cell::new(1, 2)];
        assert_eq!(compiled.states_along(&path), vec![id("login"), id("dashboard")]);
    }
}
