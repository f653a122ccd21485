//! Board and cell types.

use crate::BoardError;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Player identifier as assigned by storage. Always positive.
pub type PlayerId = i32;

/// A single board position.
///
/// On the wire a cell is an integer: `0` is empty and any positive value is
/// the id of the player occupying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    /// Nobody holds this cell.
    #[default]
    Empty,
    /// Held by the given player.
    Occupied(PlayerId),
}

impl Cell {
    /// Decodes a wire integer.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::InvalidCell`] for negative values.
    pub fn from_wire(value: i32) -> Result<Self, BoardError> {
        match value {
            0 => Ok(Self::Empty),
            id if id > 0 => Ok(Self::Occupied(id)),
            other => Err(BoardError::InvalidCell(other)),
        }
    }

    /// Encodes this cell as its wire integer.
    pub fn to_wire(self) -> i32 {
        match self {
            Self::Empty => 0,
            Self::Occupied(id) => id,
        }
    }

    /// Returns true if nobody holds the cell.
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Fixed-size ordered sequence of cells.
///
/// The size is chosen when the board is created and never changes. Boards
/// serialize as a JSON array of integers, which is also how they are
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i32>", into = "Vec<i32>")]
pub struct Board {
    cells: Vec<Cell>,
}

impl Board {
    /// Creates an all-empty board with `size` cells.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Empty`] if `size` is zero.
    #[instrument]
    pub fn empty(size: usize) -> Result<Self, BoardError> {
        if size == 0 {
            return Err(BoardError::Empty);
        }
        Ok(Self {
            cells: vec![Cell::Empty; size],
        })
    }

    /// Number of cells.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Gets the cell at `index`.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// True if `index` is on the board and nobody holds it.
    pub fn is_vacant(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Cell::Empty))
    }

    /// Replaces the cell at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::OutOfRange`] if `index` is past the end.
    pub fn set(&mut self, index: usize, cell: Cell) -> Result<(), BoardError> {
        let size = self.size();
        let slot = self
            .cells
            .get_mut(index)
            .ok_or(BoardError::OutOfRange { index, size })?;
        *slot = cell;
        Ok(())
    }

    /// All cells in order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// Wire integers in cell order.
    pub fn to_wire(&self) -> Vec<i32> {
        self.cells.iter().map(|c| c.to_wire()).collect()
    }

    /// Encodes the board as the JSON array string used for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, BoardError> {
        serde_json::to_string(&self.to_wire()).map_err(|e| BoardError::Malformed(e.to_string()))
    }

    /// Decodes a persisted JSON array string.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Malformed`] if the text is not an array of
    /// integers, or the cell-level errors of [`Board::try_from`].
    #[instrument(skip(text), fields(len = text.len()))]
    pub fn from_json(text: &str) -> Result<Self, BoardError> {
        let values: Vec<i32> =
            serde_json::from_str(text).map_err(|e| BoardError::Malformed(e.to_string()))?;
        Self::try_from(values)
    }
}

impl TryFrom<Vec<i32>> for Board {
    type Error = BoardError;

    fn try_from(values: Vec<i32>) -> Result<Self, Self::Error> {
        if values.is_empty() {
            return Err(BoardError::Empty);
        }
        let cells = values
            .into_iter()
            .map(Cell::from_wire)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cells })
    }
}

impl From<Board> for Vec<i32> {
    fn from(board: Board) -> Self {
        board.to_wire()
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = self.to_json().map_err(|_| std::fmt::Error)?;
        f.write_str(&json)
    }
}
