//! Strictly Grid - pure rules for N x N run-length games
//!
//! Tic-tac-toe generalized to square boards from 3x3 up to 15x15. The
//! run length needed to win is derived from the board size.
//!
//! # Architecture
//!
//! - **Types**: symbols, cells and the row-major board
//! - **Rules**: win and draw evaluation
//! - **AI**: exhaustive minimax on 3x3, random fallback elsewhere
//!
//! # Example
//!
//! ```
//! use strictly_grid::{Board, Outcome, Symbol, evaluate, win_condition_for};
//!
//! let mut board = Board::new(3).unwrap();
//! for index in [0, 4, 8] {
//!     board.place(index, Symbol::First).unwrap();
//! }
//! let outcome = evaluate(&board, win_condition_for(3));
//! assert!(matches!(outcome, Outcome::Win(line) if line.symbol == Symbol::First));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod ai;
mod rules;
mod types;

pub use ai::{
    DRAW_SCORE, EXACT_SEARCH_SIZE, LOSE_SCORE, Strategy, WIN_SCORE, minimax_move, random_move,
    select_move,
};
pub use rules::{
    Direction, Outcome, WinningLine, check_winner, evaluate, find_winning_line, is_full,
};
pub use types::{
    Board, BoardError, Cell, MAX_BOARD_SIZE, MIN_BOARD_SIZE, MoveError, Symbol, win_condition_for,
};
