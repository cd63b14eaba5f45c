//! Computer opponent.
//!
//! Two policies, chosen by board size:
//!
//! - **Exhaustive**: full minimax over the remaining game tree. Only
//!   tractable on the smallest board.
//! - **Random**: a uniformly random empty cell on every larger board.
//!
//! Neither policy mutates caller state. The search works on a private
//! copy of the board, placing and clearing cells in one buffer.

use crate::rules::{find_winning_line, is_full};
use crate::types::{Board, MIN_BOARD_SIZE, Symbol};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument};

/// Board edge on which exhaustive search runs.
pub const EXACT_SEARCH_SIZE: usize = MIN_BOARD_SIZE;

/// Score of a position won by the searching side.
pub const WIN_SCORE: i32 = 10;

/// Score of a position lost by the searching side.
pub const LOSE_SCORE: i32 = -WIN_SCORE;

/// Score of a drawn position.
pub const DRAW_SCORE: i32 = 0;

/// Move selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Strategy {
    /// Full minimax.
    Exhaustive,
    /// Uniformly random legal move.
    Random,
}

impl Strategy {
    /// Picks the policy for a board edge.
    pub fn for_size(size: usize) -> Self {
        if size == EXACT_SEARCH_SIZE {
            Strategy::Exhaustive
        } else {
            Strategy::Random
        }
    }
}

/// Chooses a move for `ai` using the policy for the board's size.
///
/// Returns `None` only when the board has no empty cell.
#[instrument(skip(board, rng), fields(size = board.size()))]
pub fn select_move<R: Rng + ?Sized>(
    board: &Board,
    win_condition: usize,
    ai: Symbol,
    rng: &mut R,
) -> Option<usize> {
    let strategy = Strategy::for_size(board.size());
    let choice = match strategy {
        Strategy::Exhaustive => minimax_move(board, win_condition, ai),
        Strategy::Random => random_move(board, rng),
    };
    debug!(%strategy, ?choice, "AI selected move");
    choice
}

/// Picks a uniformly random empty cell.
pub fn random_move<R: Rng + ?Sized>(board: &Board, rng: &mut R) -> Option<usize> {
    board.empty_cells().choose(rng).copied()
}

/// Best move for `ai` by exhaustive minimax.
///
/// Ties go to the first cell in scan order.
#[instrument(skip(board), fields(size = board.size()))]
pub fn minimax_move(board: &Board, win_condition: usize, ai: Symbol) -> Option<usize> {
    let mut scratch = board.clone();
    let mut best: Option<(usize, i32)> = None;

    for index in board.empty_cells() {
        if scratch.place(index, ai).is_err() {
            continue;
        }
        let score = minimax(&mut scratch, win_condition, ai, ai.opponent());
        scratch.clear(index);

        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    debug!(?best, "Minimax finished");
    best.map(|(index, _)| index)
}

/// Minimax value of `board` for `ai` with `to_move` on turn.
///
/// `board` is restored to its entry state before returning.
fn minimax(board: &mut Board, win_condition: usize, ai: Symbol, to_move: Symbol) -> i32 {
    if let Some(line) = find_winning_line(board, win_condition) {
        return if line.symbol == ai { WIN_SCORE } else { LOSE_SCORE };
    }
    if is_full(board) {
        return DRAW_SCORE;
    }

    let maximizing = to_move == ai;
    let mut best = if maximizing { i32::MIN } else { i32::MAX };

    for index in board.empty_cells() {
        if board.place(index, to_move).is_err() {
            continue;
        }
        let score = minimax(board, win_condition, ai, to_move.opponent());
        board.clear(index);

        best = if maximizing {
            best.max(score)
        } else {
            best.min(score)
        };
    }

    best
}
