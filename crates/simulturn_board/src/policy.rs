//! Round resolution policies.
//!
//! A policy decides how the moves submitted during one round become the
//! next board. Policies are pure: they never see storage or connections,
//! so the same policy can back any number of concurrent games.

use crate::{Board, BoardError, Cell, PlayerId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument, warn};

/// A player's intended cell for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingMove {
    /// Who submitted the move.
    pub player: PlayerId,
    /// Target cell index.
    pub cell: usize,
}

impl PendingMove {
    /// Creates a pending move.
    pub fn new(player: PlayerId, cell: usize) -> Self {
        Self { player, cell }
    }
}

/// Game-specific rule for merging a round of simultaneous moves.
pub trait RoundPolicy: Send + Sync + std::fmt::Debug {
    /// Number of cells on this game's board.
    fn board_size(&self) -> usize;

    /// A fresh board for the start of a game.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Empty`] if the policy reports no cells.
    fn empty_board(&self) -> Result<Board, BoardError> {
        Board::empty(self.board_size())
    }

    /// Checks that `cell` names a position on this game's board.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::OutOfRange`] for indices past the end.
    fn check_cell(&self, cell: usize) -> Result<(), BoardError> {
        let size = self.board_size();
        if cell < size {
            Ok(())
        } else {
            Err(BoardError::OutOfRange { index: cell, size })
        }
    }

    /// Computes the board that results from applying `moves` to `board`.
    fn resolve(&self, board: &Board, moves: &[PendingMove]) -> Board;
}

/// Sole claimant wins; contested cells stay empty.
///
/// For each cell that was empty before the round: exactly one claimant
/// occupies it, two or more claimants cancel each other out. Occupied cells
/// never change, whatever targets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimultaneousClaim {
    size: usize,
}

impl SimultaneousClaim {
    /// Creates the policy for a board of `size` cells.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Empty`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self, BoardError> {
        if size == 0 {
            return Err(BoardError::Empty);
        }
        Ok(Self { size })
    }

    /// The 3x3 instance.
    pub fn tic_tac_toe() -> Self {
        Self { size: 9 }
    }
}

impl Default for SimultaneousClaim {
    fn default() -> Self {
        Self::tic_tac_toe()
    }
}

impl RoundPolicy for SimultaneousClaim {
    fn board_size(&self) -> usize {
        self.size
    }

    #[instrument(skip(self, board, moves), fields(board = %board, moves = moves.len()))]
    fn resolve(&self, board: &Board, moves: &[PendingMove]) -> Board {
        let mut claims: BTreeMap<usize, BTreeSet<PlayerId>> = BTreeMap::new();
        for mv in moves {
            claims.entry(mv.cell).or_default().insert(mv.player);
        }

        let mut next = board.clone();
        for (cell, claimants) in claims {
            match board.get(cell) {
                None => {
                    warn!(cell, "Move targets a cell past the end of the board");
                }
                Some(Cell::Occupied(holder)) => {
                    debug!(cell, holder, "Cell already taken, ignoring claims");
                }
                Some(Cell::Empty) if claimants.len() == 1 => {
                    if let Some(&player) = claimants.first() {
                        match next.set(cell, Cell::Occupied(player)) {
                            Ok(()) => debug!(cell, player, "Cell claimed"),
                            Err(e) => warn!(error = %e, "Claim not applied"),
                        }
                    }
                }
                Some(Cell::Empty) => {
                    debug!(cell, claimants = ?claimants, "Contested cell stays empty");
                }
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(values: &[i32]) -> Board {
        Board::try_from(values.to_vec()).expect("valid board")
    }

    #[test]
    fn test_sole_claimant_takes_cell() {
        let policy = SimultaneousClaim::tic_tac_toe();
        let empty = policy.empty_board().expect("non-zero size");
        let next = policy.resolve(&empty, &[PendingMove::new(3, 2)]);
        assert_eq!(next.to_wire(), vec![0, 0, 3, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_conflicting_claims_cancel() {
        let policy = SimultaneousClaim::tic_tac_toe();
        let start = board(&[5, 0, 0, 0, 0, 0, 0, 0, 6]);
        let next = policy.resolve(&start, &[PendingMove::new(2, 4), PendingMove::new(3, 4)]);
        assert_eq!(next, start);
    }

    #[test]
    fn test_three_way_conflict_still_cancels() {
        let policy = SimultaneousClaim::tic_tac_toe();
        let moves = [
            PendingMove::new(2, 4),
            PendingMove::new(3, 4),
            PendingMove::new(4, 4),
        ];
        let next = policy.resolve(&policy.empty_board().expect("non-zero size"), &moves);
        assert_eq!(next.get(4), Some(Cell::Empty));
    }

    #[test]
    fn test_occupied_cell_unchanged() {
        let policy = SimultaneousClaim::tic_tac_toe();
        let start = board(&[0, 9, 0, 0, 0, 0, 0, 0, 0]);
        let next = policy.resolve(&start, &[PendingMove::new(2, 1), PendingMove::new(3, 0)]);
        assert_eq!(next.get(1), Some(Cell::Occupied(9)));
        assert_eq!(next.get(0), Some(Cell::Occupied(3)));
    }

    #[test]
    fn test_mixed_round() {
        let policy = SimultaneousClaim::new(4).expect("non-zero size");
        let moves = [
            PendingMove::new(1, 0),
            PendingMove::new(2, 0),
            PendingMove::new(3, 3),
        ];
        let next = policy.resolve(&policy.empty_board().expect("non-zero size"), &moves);
        assert_eq!(next.to_wire(), vec![0, 0, 0, 3]);
    }

    #[test]
    fn test_out_of_range_move_ignored() {
        let policy = SimultaneousClaim::new(2).expect("non-zero size");
        let empty = policy.empty_board().expect("non-zero size");
        let next = policy.resolve(&empty, &[PendingMove::new(1, 7)]);
        assert_eq!(next.to_wire(), vec![0, 0]);
    }

    #[test]
    fn test_check_cell() {
        let policy = SimultaneousClaim::tic_tac_toe();
        assert!(policy.check_cell(8).is_ok());
        assert_eq!(
            policy.check_cell(9),
            Err(BoardError::OutOfRange { index: 9, size: 9 })
        );
        assert_eq!(SimultaneousClaim::new(0), Err(BoardError::Empty));
    }
}
