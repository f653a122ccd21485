//! Game creation and player admission.

use crate::registry::SessionRegistry;
use crate::store::{Game, GameId, GameStore, NewPlayer, Player, Role, StoreError};
use derive_more::{Display, From};
use simulturn_board::PlayerId;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Service failures.
#[derive(Debug, Clone, Display, From)]
pub enum ServiceError {
    /// No such game.
    #[display("Game '{}' does not exist", game_id)]
    #[from(skip)]
    UnknownGame {
        /// Game id.
        game_id: GameId,
    },

    /// No such player in this game.
    #[display("Player {} is not attached to game '{}'", player_id, game_id)]
    #[from(skip)]
    UnknownPlayer {
        /// Game id.
        game_id: GameId,
        /// Player id.
        player_id: PlayerId,
    },

    /// Storage failed.
    #[display("{}", _0)]
    Store(StoreError),
}

impl std::error::Error for ServiceError {}

/// Creates games and admits players before they open a connection.
#[derive(Debug, Clone)]
pub struct GameService {
    store: Arc<dyn GameStore>,
    registry: Arc<SessionRegistry>,
}

impl GameService {
    /// Creates a service over `store` and `registry`.
    pub fn new(store: Arc<dyn GameStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { store, registry }
    }

    fn game(&self, game_id: &str) -> Result<Game, ServiceError> {
        self.store.get_game(game_id).map_err(|e| {
            if e.is_not_found() {
                ServiceError::UnknownGame {
                    game_id: game_id.to_string(),
                }
            } else {
                ServiceError::Store(e)
            }
        })
    }

    /// Creates a game in the lobby together with its host player.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if storage fails.
    #[instrument(skip(self))]
    pub async fn create_game(&self) -> Result<(Game, Player), ServiceError> {
        let game = Game::lobby(uuid::Uuid::new_v4().to_string());
        self.store.insert_game(&game)?;
        let host = self
            .store
            .insert_player(NewPlayer::new(game.id.clone(), Role::Host))?;
        self.registry.ensure(&game.id).await;
        info!(game_id = %game.id, host_id = host.id, "Game created");
        Ok((game, host))
    }

    /// Admits a player to `game_id`.
    ///
    /// A `returning` id that names a known player reuses that player,
    /// moving it into this game (with its pending move cleared) if it was
    /// attached elsewhere. Another game's host is never moved, since that
    /// game would be left without one; it gets a new participant instead,
    /// as does an unknown id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownGame`] for a missing game, or
    /// [`ServiceError::Store`] if storage fails.
    #[instrument(skip(self))]
    pub async fn connect(
        &self,
        game_id: &str,
        returning: Option<PlayerId>,
    ) -> Result<Player, ServiceError> {
        self.game(game_id)?;

        if let Some(player_id) = returning {
            match self.store.get_player(player_id) {
                Ok(player) if player.game_id == game_id => {
                    debug!("Returning player");
                    return Ok(player);
                }
                Ok(player) if player.role.is_host() => {
                    debug!(
                        from = %player.game_id,
                        "Returning id hosts another game, creating a new player"
                    );
                }
                Ok(mut player) => {
                    info!(from = %player.game_id, "Moving returning player to this game");
                    player.game_id = game_id.to_string();
                    player.pending_move = None;
                    self.store.update_player(&player)?;
                    return Ok(player);
                }
                Err(e) if e.is_not_found() => {
                    debug!(player_id, "Unknown returning player, creating a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let player = self
            .store
            .insert_player(NewPlayer::new(game_id.to_string(), Role::Participant))?;
        info!(player_id = player.id, "Player admitted");
        Ok(player)
    }

    /// Loads the game and one of its players, as needed to open a
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownGame`] or
    /// [`ServiceError::UnknownPlayer`] if either is missing or the player
    /// belongs to another game.
    #[instrument(skip(self))]
    pub fn lookup(
        &self,
        game_id: &str,
        player_id: PlayerId,
    ) -> Result<(Game, Player), ServiceError> {
        let game = self.game(game_id)?;
        let unknown = || ServiceError::UnknownPlayer {
            game_id: game_id.to_string(),
            player_id,
        };
        let player = match self.store.get_player(player_id) {
            Ok(player) => player,
            Err(e) if e.is_not_found() => return Err(unknown()),
            Err(e) => return Err(e.into()),
        };
        if player.game_id != game_id {
            return Err(unknown());
        }
        Ok((game, player))
    }
}
