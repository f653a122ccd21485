//! Pure board state and round resolution for simultaneous-move games.
//!
//! Nothing in this crate performs I/O. A [`Board`] is a fixed-size row of
//! [`Cell`]s, and a [`RoundPolicy`] turns the moves every player submitted
//! during a round into the next board.
//!
//! # Example
//!
//! ```
//! use simulturn_board::{Board, Cell, PendingMove, RoundPolicy, SimultaneousClaim};
//!
//! let policy = SimultaneousClaim::tic_tac_toe();
//! let board = policy.empty_board().expect("non-zero size");
//! let next = policy.resolve(&board, &[PendingMove::new(7, 2), PendingMove::new(8, 4)]);
//! assert_eq!(next.get(2), Some(Cell::Occupied(7)));
//! assert_eq!(next.get(4), Some(Cell::Occupied(8)));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod board;
mod error;
mod policy;

pub use board::{Board, Cell, PlayerId};
pub use error::BoardError;
pub use policy::{PendingMove, RoundPolicy, SimultaneousClaim};
