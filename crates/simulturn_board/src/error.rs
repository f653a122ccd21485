//! Board error types.

/// Errors raised while building, decoding, or editing a board.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum BoardError {
    /// A cell index past the end of the board.
    #[display("Cell {} is outside a board of {} cells", index, size)]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of cells on the board.
        size: usize,
    },

    /// A wire value that is neither 0 nor a positive player id.
    #[display("Invalid cell value {}", _0)]
    InvalidCell(i32),

    /// A board with no cells.
    #[display("Board must have at least one cell")]
    Empty,

    /// The persisted board string is not a JSON array of integers.
    #[display("Malformed board encoding: {}", _0)]
    Malformed(String),
}

impl std::error::Error for BoardError {}
