//! Core domain types for N x N grid games.

use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Smallest supported board edge.
pub const MIN_BOARD_SIZE: usize = 3;

/// Largest supported board edge.
pub const MAX_BOARD_SIZE: usize = 15;

/// One of the two movers in a match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Symbol {
    /// Moves first. Shown as "X".
    #[serde(rename = "X")]
    #[strum(serialize = "X")]
    First,
    /// Moves second. Shown as "O".
    #[serde(rename = "O")]
    #[strum(serialize = "O")]
    Second,
}

impl Symbol {
    /// Returns the other symbol.
    pub fn opponent(self) -> Self {
        match self {
            Symbol::First => Symbol::Second,
            Symbol::Second => Symbol::First,
        }
    }

    /// Slot index of this symbol (First = 0, Second = 1).
    pub fn index(self) -> usize {
        match self {
            Symbol::First => 0,
            Symbol::Second => 1,
        }
    }
}

/// A cell on the board. Serialized as `null`, `"X"` or `"O"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<Symbol>", into = "Option<Symbol>")]
pub enum Cell {
    /// Nobody has played here.
    Empty,
    /// Cell claimed by a symbol.
    Occupied(Symbol),
}

impl Cell {
    /// Returns the occupying symbol, if any.
    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Cell::Empty => None,
            Cell::Occupied(symbol) => Some(symbol),
        }
    }
}

impl From<Option<Symbol>> for Cell {
    fn from(symbol: Option<Symbol>) -> Self {
        symbol.map_or(Cell::Empty, Cell::Occupied)
    }
}

impl From<Cell> for Option<Symbol> {
    fn from(cell: Cell) -> Self {
        cell.symbol()
    }
}

/// Error raised when a board cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum BoardError {
    /// The requested edge length is outside the supported range.
    #[display("Unsupported board size {} (expected {}..={})", size, MIN_BOARD_SIZE, MAX_BOARD_SIZE)]
    UnsupportedSize {
        /// Requested edge length.
        size: usize,
    },
}

/// Error raised when a placement is structurally illegal.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum MoveError {
    /// Index does not address a cell.
    #[display("Cell {} is out of range (board has {} cells)", index, len)]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of cells on the board.
        len: usize,
    },
    /// Cell already holds a symbol.
    #[display("Cell {} is already occupied", _0)]
    Occupied(#[error(not(source))] usize),
}

/// Run length required to win on a board of the given edge.
///
/// 3x3 needs 3, 4x4 needs 4, anything larger needs 5.
#[instrument]
pub fn win_condition_for(size: usize) -> usize {
    size.min(5)
}

/// Square board addressed row-major (`row * size + col`).
///
/// Only built through [`Board::new`], so the cell count is always `size²`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Creates an empty board with `size * size` cells.
    #[instrument]
    pub fn new(size: usize) -> Result<Self, BoardError> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(BoardError::UnsupportedSize { size });
        }
        Ok(Self {
            size,
            cells: vec![Cell::Empty; size * size],
        })
    }

    /// Edge length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of cells (`size * size`).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false; a board has at least nine cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Gets the cell at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Whether the cell at `index` exists and is empty.
    pub fn is_vacant(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Cell::Empty))
    }

    /// Claims the cell at `index` for `symbol`.
    pub fn place(&mut self, index: usize, symbol: Symbol) -> Result<(), MoveError> {
        let len = self.cells.len();
        match self.cells.get_mut(index) {
            None => Err(MoveError::OutOfRange { index, len }),
            Some(Cell::Occupied(_)) => Err(MoveError::Occupied(index)),
            Some(cell) => {
                *cell = Cell::Occupied(symbol);
                Ok(())
            }
        }
    }

    /// Empties the cell at `index`. Used to undo probes during search.
    pub fn clear(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = Cell::Empty;
        }
    }

    /// Whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| *cell != Cell::Empty)
    }

    /// Indices of all empty cells, in scan order.
    pub fn empty_cells(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell == Cell::Empty)
            .map(|(index, _)| index)
            .collect()
    }

    /// Row-major index of (`row`, `col`).
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.size + col
    }

    /// (`row`, `col`) of a row-major index.
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index / self.size, index % self.size)
    }

    /// Formats the board as a text grid, `.` for empty cells.
    pub fn render(&self) -> String {
        self.cells
            .chunks(self.size)
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Empty => ".".to_string(),
                        Cell::Occupied(symbol) => symbol.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
