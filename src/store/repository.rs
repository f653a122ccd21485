//! The storage seam used by the broker core.

use crate::store::{Game, NewPlayer, Player, StoreError};
use simulturn_board::PlayerId;

/// Durable storage of games and players.
///
/// Every operation may fail. Callers treat a failure as terminal for the
/// connection that triggered it.
pub trait GameStore: Send + Sync + std::fmt::Debug {
    /// Loads a game.
    fn get_game(&self, id: &str) -> Result<Game, StoreError>;

    /// Inserts a new game. Fails if the id is taken.
    fn insert_game(&self, game: &Game) -> Result<(), StoreError>;

    /// Overwrites an existing game's state and board.
    fn update_game(&self, game: &Game) -> Result<(), StoreError>;

    /// Loads a player.
    fn get_player(&self, id: PlayerId) -> Result<Player, StoreError>;

    /// Inserts a player with no pending move and returns it with its id.
    fn insert_player(&self, player: NewPlayer) -> Result<Player, StoreError>;

    /// Overwrites an existing player.
    fn update_player(&self, player: &Player) -> Result<(), StoreError>;

    /// All players attached to a game, ordered by id.
    fn players_in_game(&self, game_id: &str) -> Result<Vec<Player>, StoreError>;
}
