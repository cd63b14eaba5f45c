//! Win detection logic for run-length grid games.

use crate::types::{Board, Symbol};
use serde::{Deserialize, Serialize};

/// Direction a run grows in from its origin cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Left to right.
    Row,
    /// Top to bottom.
    Column,
    /// Top-left to bottom-right.
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
}

impl Direction {
    /// Row and column step.
    fn step(self) -> (isize, isize) {
        match self {
            Direction::Row => (0, 1),
            Direction::Column => (1, 0),
            Direction::Diagonal => (1, 1),
            Direction::AntiDiagonal => (1, -1),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Direction::Row => "row",
            Direction::Column => "col",
            Direction::Diagonal => "diag",
            Direction::AntiDiagonal => "anti",
        }
    }
}

/// A completed run of one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WinningLine {
    /// Symbol owning the run.
    pub symbol: Symbol,
    /// Direction of the run.
    pub direction: Direction,
    /// Cell indices, origin first.
    pub cells: Vec<usize>,
}

impl WinningLine {
    /// Stable identifier such as `row-3` or `anti-2` (direction and origin cell).
    pub fn id(&self) -> String {
        let origin = self.cells.first().copied().unwrap_or_default();
        format!("{}-{}", self.direction.prefix(), origin)
    }
}

/// Finds the first run of `win_condition` identical symbols.
///
/// Cells are scanned in row-major order and each occupied cell only
/// grows runs forward (right, down, down-right, down-left), so every
/// run is examined exactly once from its origin.
pub fn find_winning_line(board: &Board, win_condition: usize) -> Option<WinningLine> {
    let size = board.size();
    if win_condition == 0 || win_condition > size {
        return None;
    }
    let span = (win_condition - 1) as isize;
    let edge = size as isize;

    for (origin, cell) in board.cells().iter().enumerate() {
        let Some(symbol) = cell.symbol() else {
            continue;
        };
        let (row, col) = board.coords(origin);
        let (row, col) = (row as isize, col as isize);

        for direction in [
            Direction::Row,
            Direction::Column,
            Direction::Diagonal,
            Direction::AntiDiagonal,
        ] {
            let (dr, dc) = direction.step();
            let end_row = row + dr * span;
            let end_col = col + dc * span;
            if end_row >= edge || end_col < 0 || end_col >= edge {
                continue;
            }

            let run = (0..win_condition as isize)
                .map(|k| board.index((row + dr * k) as usize, (col + dc * k) as usize));
            let complete = run
                .clone()
                .all(|index| board.get(index).and_then(|c| c.symbol()) == Some(symbol));
            if complete {
                return Some(WinningLine {
                    symbol,
                    direction,
                    cells: run.collect(),
                });
            }
        }
    }

    None
}

/// Checks if there is a winner on the board.
///
/// Returns `Some(symbol)` if the symbol has `win_condition` in a row.
pub fn check_winner(board: &Board, win_condition: usize) -> Option<Symbol> {
    find_winning_line(board, win_condition).map(|line| line.symbol)
}
