use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GridError;
use crate::token::Token;

/// Grid coordinate. Serialized as `[row, col]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn is_adjacent(&self, other: &Cell) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }
}

impl From<(usize, usize)> for Cell {
    fn from((row, col): (usize, usize)) -> Self {
        Cell { row, col }
    }
}

impl From<Cell> for (usize, usize) {
    fn from(cell: Cell) -> Self {
        (cell.row, cell.col)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Deserialize)]
struct RawGrid {
    tokens: Vec<u8>,
    width: usize,
    height: usize,
}

/// Row-major token matrix. Always holds exactly one START and one TARGET,
/// except the single-cell grid where START stands for both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct TokenGrid {
    tokens: Vec<u8>,
    width: usize,
    height: usize,
}

impl TryFrom<RawGrid> for TokenGrid {
    type Error = GridError;

    fn try_from(raw: RawGrid) -> Result<Self, Self::Error> {
        TokenGrid::from_tokens(raw.tokens, raw.width, raw.height)
    }
}

impl TokenGrid {
    /// All-wall grid. Markers must be placed before it is handed to a solver.
    pub(crate) fn walls(width: usize, height: usize) -> Self {
        Self {
            tokens: vec![Token::Wall.as_u8(); width * height],
            width,
            height,
        }
    }

    pub fn from_tokens(tokens: Vec<u8>, width: usize, height: usize) -> Result<Self, GridError> {
        // Dimensions come off the wire; an overflowing product is never a valid shape.
        let expected = width.checked_mul(height).unwrap_or(usize::MAX);
        if expected == 0 || tokens.len() != expected {
            return Err(GridError::InvalidShape {
                width,
                height,
                expected,
                actual: tokens.len(),
            });
        }
        if let Some(&bad) = tokens
            .iter()
            .find(|&&t| !matches!(Token::from_u8(t), Some(tok) if tok != Token::Solution))
        {
            return Err(GridError::InvalidToken(bad));
        }
        let grid = Self {
            tokens,
            width,
            height,
        };
        grid.markers()?;
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tokens(&self) -> &[u8] {
        &self.tokens
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.height && cell.col < self.width
    }

    pub fn get(&self, cell: Cell) -> Option<Token> {
        if !self.contains(cell) {
            return None;
        }
        Token::from_u8(self.tokens[cell.row * self.width + cell.col])
    }

    pub(crate) fn set(&mut self, cell: Cell, token: Token) {
        if self.contains(cell) {
            self.tokens[cell.row * self.width + cell.col] = token.as_u8();
        }
    }

    pub fn is_passable(&self, cell: Cell) -> bool {
        self.get(cell).map(Token::is_passable).unwrap_or(false)
    }

    /// In-bounds neighbours in fixed order: up, down, left, right.
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        let up = cell.row.checked_sub(1).map(|row| Cell::new(row, cell.col));
        let down = Some(Cell::new(cell.row + 1, cell.col));
        let left = cell.col.checked_sub(1).map(|col| Cell::new(cell.row, col));
        let right = Some(Cell::new(cell.row, cell.col + 1));
        [up, down, left, right]
            .into_iter()
            .flatten()
            .filter(move |next| self.contains(*next))
    }

    /// START and TARGET cells.
    pub fn markers(&self) -> Result<(Cell, Cell), GridError> {
        let starts = self.find(Token::Start);
        let targets = self.find(Token::Target);
        if self.tokens.len() == 1 && starts.len() == 1 && targets.is_empty() {
            return Ok((starts[0], starts[0]));
        }
        for (token, found) in [(Token::Start, &starts), (Token::Target, &targets)] {
            if found.len() != 1 {
                return Err(GridError::MarkerCount {
                    token: token.name(),
                    count: found.len(),
                });
            }
        }
        Ok((starts[0], targets[0]))
    }

    fn find(&self, token: Token) -> Vec<Cell> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == token.as_u8())
            .map(|(idx, _)| Cell::new(idx / self.width, idx % self.width))
            .collect()
    }

    /// Tokens with SOLUTION drawn over the walkable cells of `path`.
    pub fn overlay(&self, path: &[Cell]) -> Vec<u8> {
        let mut tokens = self.tokens.clone();
        for cell in path.iter().filter(|c| self.contains(**c)) {
            let idx = cell.row * self.width + cell.col;
            if tokens[idx] == Token::Walkable.as_u8() {
                tokens[idx] = Token::Solution.as_u8();
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_round_trips_through_validation() {
        let json = r#"{"tokens":[2,1,0,3],"width":2,"height":2}"#;
        let grid: TokenGrid = serde_json::from_str(json).unwrap();
        assert_eq!(grid.markers().unwrap(), (Cell::new(0, 0), Cell::new(1, 1)));
        assert_eq!(serde_json::to_string(&grid).unwrap(), json);
        assert_eq!(serde_json::to_string(&Cell::new(3, 4)).unwrap(), "[3,4]");
    }

    #[test]
    fn rejects_bad_grids() {
        assert!(matches!(
            TokenGrid::from_tokens(vec![2, 3, 1], 2, 2),
            Err(GridError::InvalidShape { expected: 4, .. })
        ));
        assert_eq!(
            TokenGrid::from_tokens(vec![2, 9, 1, 3], 2, 2),
            Err(GridError::InvalidToken(9))
        );
        assert_eq!(
            TokenGrid::from_tokens(vec![2, 2, 1, 3], 2, 2),
            Err(GridError::MarkerCount { token: "START", count: 2 })
        );
        assert!(serde_json::from_str::<TokenGrid>(r#"{"tokens":[1,1],"width":2,"height":1}"#).is_err());
    }

    #[test]
    fn oversized_dimensions_are_an_invalid_shape() {
        let huge = 1usize << (usize::BITS / 2 + 8);
        assert!(matches!(
            TokenGrid::from_tokens(vec![2, 3], huge, huge),
            Err(GridError::InvalidShape { expected: usize::MAX, actual: 2, .. })
        ));
        let raw = format!(r#"{{"tokens":[2,3],"width":{huge},"height":{huge}}}"#);
        assert!(serde_json::from_str::<TokenGrid>(&raw).is_err());
    }

    #[test]
    fn single_cell_start_is_also_target() {
        let grid = TokenGrid::from_tokens(vec![2], 1, 1).unwrap();
        assert_eq!(grid.markers().unwrap(), (Cell::new(0, 0), Cell::new(0, 0)));
    }

    #[test]
    fn neighbours_come_in_direction_order() {
        let grid = TokenGrid::from_tokens(vec![2, 1, 1, 1, 1, 1, 1, 1, 3], 3, 3).unwrap();
        let around: Vec<_> = grid.neighbors(Cell::new(1, 1)).collect();
        assert_eq!(
            around,
            vec![Cell::new(0, 1), Cell::new(2, 1), Cell::new(1, 0), Cell::new(1, 2)]
        );
        assert_eq!(grid.neighbors(Cell::new(0, 0)).count(), 2);
    }
}
