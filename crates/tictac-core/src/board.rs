//! Board representation and line rules
//!
//! A board is always exactly nine cells; the array type makes any other length
//! unrepresentable and JSON input of the wrong length fails to decode.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::{GameError, GameResult};

/// Number of cells on a board
pub const BOARD_CELLS: usize = 9;

/// Every winning line as cell indices, rows then columns then diagonals
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

// ----------------------------------------------------------------------------
// Mark
// ----------------------------------------------------------------------------

/// A player's symbol; also names whose turn it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// The other player's mark
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::X => "X",
            Mark::O => "O",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mark {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" | "x" => Ok(Mark::X),
            "O" | "o" => Ok(Mark::O),
            other => Err(GameError::invalid_move(format!("unknown mark '{}'", other))),
        }
    }
}

/// One board cell: empty or holding a mark
pub type Cell = Option<Mark>;

// ----------------------------------------------------------------------------
// Board
// ----------------------------------------------------------------------------

/// A cell that differs between two boards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub previous: Cell,
    pub mark: Mark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([Cell; BOARD_CELLS]);

impl Board {
    /// Nine empty cells
    pub fn empty() -> Self {
        Self([None; BOARD_CELLS])
    }

    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self(cells)
    }

    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.0.get(index).copied()
    }

    /// Return a copy with `mark` written at `index`, which must be empty
    pub fn with_mark(&self, index: usize, mark: Mark) -> GameResult<Self> {
        match self.get(index) {
            None => Err(GameError::invalid_move(format!(
                "cell index {} is outside the board",
                index
            ))),
            Some(Some(existing)) => Err(GameError::invalid_move(format!(
                "cell {} already holds {}",
                index, existing
            ))),
            Some(None) => {
                let mut cells = self.0;
                cells[index] = Some(mark);
                Ok(Self(cells))
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn count(&self, mark: Mark) -> usize {
        self.0.iter().filter(|cell| **cell == Some(mark)).count()
    }

    /// Mark owning a completed line, if any
    pub fn winner(&self) -> Option<Mark> {
        LINES.iter().find_map(|[a, b, c]| match (self.0[*a], self.0[*b], self.0[*c]) {
            (Some(x), Some(y), Some(z)) if x == y && y == z => Some(x),
            _ => None,
        })
    }

    /// Indices that are filled here but empty in `next`
    pub fn cleared_cells(&self, next: &Board) -> Vec<usize> {
        (0..BOARD_CELLS)
            .filter(|&i| self.0[i].is_some() && next.0[i].is_none())
            .collect()
    }

    /// Cells where `next` holds a mark different from this board
    pub fn placements(&self, next: &Board) -> Vec<Placement> {
        (0..BOARD_CELLS)
            .filter_map(|i| match next.0[i] {
                Some(mark) if self.0[i] != Some(mark) => Some(Placement {
                    index: i,
                    previous: self.0[i],
                    mark,
                }),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.0.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for cell in chunk {
                f.write_str(cell.map(|m| m.as_str()).unwrap_or("."))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(layout: &str) -> Board {
        let mut cells = [None; BOARD_CELLS];
        for (i, ch) in layout.chars().filter(|c| !c.is_whitespace()).enumerate() {
            cells[i] = match ch {
                'X' => Some(Mark::X),
                'O' => Some(Mark::O),
                _ => None,
            };
        }
        Board::from_cells(cells)
    }

    #[test]
    fn test_winner_detection() {
        assert_eq!(board("XXX OO. ...").winner(), Some(Mark::X));
        assert_eq!(board("XO. XO. .O.").winner(), Some(Mark::O));
        assert_eq!(board("O.X .X. XO.").winner(), Some(Mark::X));
        assert_eq!(board("XOX XOO OXX").winner(), None);
        assert_eq!(Board::empty().winner(), None);
    }

    #[test]
    fn test_full_and_empty() {
        assert!(Board::empty().is_empty());
        assert!(!Board::empty().is_full());
        assert!(board("XOX XOO OXX").is_full());
    }

    #[test]
    fn test_with_mark_rejects_occupied_and_out_of_range() {
        let b = Board::empty().with_mark(4, Mark::X).unwrap();
        assert_eq!(b.get(4), Some(Some(Mark::X)));
        assert!(b.with_mark(4, Mark::O).is_err());
        assert!(b.with_mark(9, Mark::O).is_err());
    }

    #[test]
    fn test_diffing() {
        let before = board("X.. ... ...");
        let overwrite = board("O.. .X. ...");
        let cleared = board("... ... ...");

        assert_eq!(before.cleared_cells(&cleared), vec![0]);
        assert!(before.cleared_cells(&overwrite).is_empty());

        let placements = before.placements(&overwrite);
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].previous, Some(Mark::X));
        assert_eq!(placements[1].index, 4);
    }

    #[test]
    fn test_json_shape_matches_clients() {
        let b = Board::empty().with_mark(0, Mark::X).unwrap();
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, r#"["X",null,null,null,null,null,null,null,null]"#);

        let short: Result<Board, _> = serde_json::from_str("[null,null]");
        assert!(short.is_err());
    }

    #[test]
    fn test_mark_parsing() {
        assert_eq!("x".parse::<Mark>().unwrap(), Mark::X);
        assert_eq!(Mark::O.opponent(), Mark::X);
        assert!("Z".parse::<Mark>().is_err());
    }
}
