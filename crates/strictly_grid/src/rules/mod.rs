//! Game rules for grid games.
//!
//! Pure functions for evaluating a board against a run-length win
//! condition. Rules are separated from board storage so the search
//! engine and the session layer evaluate positions the same way.

pub mod draw;
pub mod win;

pub use draw::is_full;
pub use win::{Direction, WinningLine, check_winner, find_winning_line};

use crate::types::Board;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Terminal status of a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// No winner yet and at least one empty cell.
    InProgress,
    /// A symbol completed a run.
    Win(WinningLine),
    /// Board full with no run.
    Draw,
}

impl Outcome {
    /// Whether the position is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Evaluates `board` against a run length of `win_condition`.
///
/// Returns `Draw` only when no run exists and the board is full.
#[instrument(skip(board), fields(size = board.size()))]
pub fn evaluate(board: &Board, win_condition: usize) -> Outcome {
    if let Some(line) = find_winning_line(board, win_condition) {
        Outcome::Win(line)
    } else if is_full(board) {
        Outcome::Draw
    } else {
        Outcome::InProgress
    }
}
