//! Per-game turn state machine.
//!
//! The engine owns every mutation of game state, board, and pending moves.
//! All operations on one game are serialized by a per-game async lock, so a
//! move recorded by [`TurnEngine::submit_move`] is always visible to the
//! next [`TurnEngine::try_resolve_round`] on that game.

use crate::store::{Game, GameId, GameState, GameStore, StoreError};
use derive_more::{Display, From};
use simulturn_board::{Board, BoardError, PendingMove, PlayerId, RoundPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Turn engine failures.
#[derive(Debug, Clone, Display, From)]
pub enum TurnError {
    /// The operation needs a different game state.
    #[display("Game '{}' is in state '{}'", game_id, state)]
    #[from(skip)]
    InvalidState {
        /// Game id.
        game_id: GameId,
        /// State the game was in.
        state: GameState,
    },

    /// The player is not a non-host member of this game.
    #[display("Player {} is not a participant of game '{}'", player_id, game_id)]
    #[from(skip)]
    NotAParticipant {
        /// Game id.
        game_id: GameId,
        /// Player id.
        player_id: PlayerId,
    },

    /// The move names a cell that is not on the board.
    #[display("Illegal move: {}", _0)]
    Board(BoardError),

    /// Storage failed.
    #[display("{}", _0)]
    Store(StoreError),
}

impl std::error::Error for TurnError {}

impl TurnError {
    /// True for errors that should close the calling connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Some connected player has not moved yet. Nothing changed.
    Waiting,
    /// The round was applied; this is the new board.
    Resolved(Board),
}

impl RoundOutcome {
    /// True if the round was applied.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Applies host state changes and player moves to stored games.
#[derive(Debug)]
pub struct TurnEngine {
    store: Arc<dyn GameStore>,
    policy: Arc<dyn RoundPolicy>,
    locks: Mutex<HashMap<GameId, Arc<Mutex<()>>>>,
}

impl TurnEngine {
    /// Creates an engine that persists through `store` and merges rounds
    /// with `policy`.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn GameStore>, policy: Arc<dyn RoundPolicy>) -> Self {
        info!(board_size = policy.board_size(), "Creating turn engine");
        Self {
            store,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The round policy in use.
    pub fn policy(&self) -> &Arc<dyn RoundPolicy> {
        &self.policy
    }

    async fn game_lock(&self, game_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(game_id.to_string()).or_default())
    }

    /// Moves `game_id` to `state`.
    ///
    /// Entering [`GameState::InProgress`] resets the board to all-empty and
    /// clears every pending move. Other transitions keep the board.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::Store`] if storage fails.
    #[instrument(skip(self, state), fields(state = %state))]
    pub async fn change_state(&self, game_id: &str, state: GameState) -> Result<Game, TurnError> {
        let lock = self.game_lock(game_id).await;
        let _guard = lock.lock().await;

        let mut game = self.store.get_game(game_id)?;
        debug!(from = %game.state, "Changing game state");

        if state.is_in_progress() {
            game.board = Some(self.policy.empty_board()?);
            for mut player in self.store.players_in_game(game_id)? {
                if player.pending_move.take().is_some() {
                    self.store.update_player(&player)?;
                }
            }
            info!("Game started with a fresh board");
        }
        game.state = state;
        self.store.update_game(&game)?;
        Ok(game)
    }

    /// Records `player_id`'s intended cell. Does not touch the board.
    /// Submitting again before the round resolves overwrites the earlier
    /// choice.
    ///
    /// # Errors
    ///
    /// - [`TurnError::InvalidState`] unless the game is in progress.
    /// - [`TurnError::Board`] if `cell` is off the board.
    /// - [`TurnError::NotAParticipant`] for the host or a player of another game.
    /// - [`TurnError::Store`] if storage fails.
    #[instrument(skip(self))]
    pub async fn submit_move(
        &self,
        game_id: &str,
        player_id: PlayerId,
        cell: usize,
    ) -> Result<(), TurnError> {
        let lock = self.game_lock(game_id).await;
        let _guard = lock.lock().await;

        let game = self.store.get_game(game_id)?;
        if !game.state.is_in_progress() {
            return Err(TurnError::InvalidState {
                game_id: game.id,
                state: game.state,
            });
        }
        self.policy.check_cell(cell)?;

        let mut player = self.store.get_player(player_id)?;
        if player.game_id != game_id || player.role.is_host() {
            return Err(TurnError::NotAParticipant {
                game_id: game_id.to_string(),
                player_id,
            });
        }
        if let Some(previous) = player.pending_move.replace(cell) {
            debug!(previous, "Overwriting earlier move");
        }
        self.store.update_player(&player)?;
        debug!("Move recorded");
        Ok(())
    }

    /// Clears `player_id`'s pending move. Called whenever the player
    /// (re)joins.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::Store`] if storage fails.
    #[instrument(skip(self))]
    pub async fn reset_pending(&self, game_id: &str, player_id: PlayerId) -> Result<(), TurnError> {
        let lock = self.game_lock(game_id).await;
        let _guard = lock.lock().await;

        let mut player = self.store.get_player(player_id)?;
        if player.pending_move.take().is_some() {
            self.store.update_player(&player)?;
            debug!("Pending move cleared");
        }
        Ok(())
    }

    /// Resolves the current round if every connected non-host player has a
    /// pending move.
    ///
    /// `connected` is the set of players reachable right now; members of
    /// the game who are not connected neither block nor join the round. A
    /// round with no connected participants is never resolvable.
    ///
    /// # Errors
    ///
    /// - [`TurnError::InvalidState`] unless the game is in progress.
    /// - [`TurnError::Store`] if storage fails.
    #[instrument(skip(self, connected), fields(connected = connected.len()))]
    pub async fn try_resolve_round(
        &self,
        game_id: &str,
        connected: &[PlayerId],
    ) -> Result<RoundOutcome, TurnError> {
        let lock = self.game_lock(game_id).await;
        let _guard = lock.lock().await;

        let mut game = self.store.get_game(game_id)?;
        if !game.state.is_in_progress() {
            return Err(TurnError::InvalidState {
                game_id: game.id,
                state: game.state,
            });
        }

        let participants: Vec<_> = self
            .store
            .players_in_game(game_id)?
            .into_iter()
            .filter(|p| !p.role.is_host() && connected.contains(&p.id))
            .collect();
        if participants.is_empty() {
            debug!("No connected participants");
            return Ok(RoundOutcome::Waiting);
        }

        let mut moves = Vec::with_capacity(participants.len());
        for player in &participants {
            match player.pending_move {
                Some(cell) => moves.push(PendingMove::new(player.id, cell)),
                None => {
                    debug!(waiting_on = player.id, "Round cannot be resolved yet");
                    return Ok(RoundOutcome::Waiting);
                }
            }
        }

        let board = match game.board.take() {
            Some(board) => board,
            None => {
                warn!("In-progress game had no board, starting from empty");
                self.policy.empty_board()?
            }
        };
        let next = self.policy.resolve(&board, &moves);
        game.board = Some(next.clone());
        self.store.update_game(&game)?;

        for mut player in participants {
            player.pending_move = None;
            self.store.update_player(&player)?;
        }

        info!(board = %next, moves = moves.len(), "Round resolved");
        Ok(RoundOutcome::Resolved(next))
    }
}
