//! In-process store backed by hash maps.

use crate::store::{Game, GameId, GameStore, NewPlayer, Player, StoreError};
use simulturn_board::PlayerId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    players: BTreeMap<PlayerId, Player>,
    next_player: PlayerId,
}

/// Volatile [`GameStore`] for tests and throwaway servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        debug!("Creating in-memory store");
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::backend("Memory store lock poisoned"))
    }
}

impl GameStore for MemoryStore {
    #[instrument(skip(self))]
    fn get_game(&self, id: &str) -> Result<Game, StoreError> {
        self.tables()?
            .games
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("Game '{}'", id)))
    }

    #[instrument(skip(self, game), fields(game_id = %game.id))]
    fn insert_game(&self, game: &Game) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables.games.contains_key(&game.id) {
            return Err(StoreError::backend(format!(
                "Game '{}' already exists",
                game.id
            )));
        }
        tables.games.insert(game.id.clone(), game.clone());
        Ok(())
    }

    #[instrument(skip(self, game), fields(game_id = %game.id, state = %game.state))]
    fn update_game(&self, game: &Game) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .games
            .get_mut(&game.id)
            .ok_or_else(|| StoreError::not_found(format!("Game '{}'", game.id)))?;
        *slot = game.clone();
        Ok(())
    }

    #[instrument(skip(self))]
    fn get_player(&self, id: PlayerId) -> Result<Player, StoreError> {
        self.tables()?
            .players
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("Player {}", id)))
    }

    #[instrument(skip(self, player), fields(game_id = %player.game_id, role = %player.role))]
    fn insert_player(&self, player: NewPlayer) -> Result<Player, StoreError> {
        let mut tables = self.tables()?;
        tables.next_player += 1;
        let row = Player {
            id: tables.next_player,
            game_id: player.game_id,
            role: player.role,
            pending_move: None,
        };
        tables.players.insert(row.id, row.clone());
        debug!(player_id = row.id, "Player inserted");
        Ok(row)
    }

    #[instrument(skip(self, player), fields(player_id = player.id))]
    fn update_player(&self, player: &Player) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .players
            .get_mut(&player.id)
            .ok_or_else(|| StoreError::not_found(format!("Player {}", player.id)))?;
        *slot = player.clone();
        Ok(())
    }

    #[instrument(skip(self))]
    fn players_in_game(&self, game_id: &str) -> Result<Vec<Player>, StoreError> {
        Ok(self
            .tables()?
            .players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }
}
