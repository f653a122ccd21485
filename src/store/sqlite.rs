//! SQLite store built on diesel.

use crate::store::{Game, GameState, GameStore, NewPlayer, Player, Role, StoreError, schema};
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use simulturn_board::{Board, PlayerId};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Stored in `players.pending_move` when no move has been submitted.
const NO_MOVE: i32 = -1;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::games)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct GameRow {
    id: String,
    state: String,
    board: Option<String>,
}

impl GameRow {
    fn from_game(game: &Game) -> Result<Self, StoreError> {
        Ok(Self {
            id: game.id.clone(),
            state: game.state.as_wire().to_string(),
            board: game.board.as_ref().map(Board::to_json).transpose()?,
        })
    }

    fn into_game(self) -> Result<Game, StoreError> {
        let board = self.board.as_deref().map(Board::from_json).transpose()?;
        Ok(Game {
            id: self.id,
            state: GameState::from_wire(&self.state),
            board,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::players)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct PlayerRow {
    id: i32,
    game_id: String,
    role: String,
    pending_move: i32,
}

impl PlayerRow {
    fn into_player(self) -> Result<Player, StoreError> {
        let role = Role::from_str(&self.role).map_err(|_| {
            StoreError::corrupt(format!("Player {} has unknown role '{}'", self.id, self.role))
        })?;
        let pending_move = decode_move(self.id, self.pending_move)?;
        Ok(Player {
            id: self.id,
            game_id: self.game_id,
            role,
            pending_move,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schema::players)]
struct NewPlayerRow<'a> {
    game_id: &'a str,
    role: &'a str,
    pending_move: i32,
}

fn decode_move(player_id: PlayerId, value: i32) -> Result<Option<usize>, StoreError> {
    if value == NO_MOVE {
        return Ok(None);
    }
    usize::try_from(value).map(Some).map_err(|_| {
        StoreError::corrupt(format!(
            "Player {} has invalid pending move {}",
            player_id, value
        ))
    })
}

fn encode_move(cell: Option<usize>) -> Result<i32, StoreError> {
    match cell {
        None => Ok(NO_MOVE),
        Some(cell) => i32::try_from(cell)
            .map_err(|_| StoreError::backend(format!("Cell {} does not fit the schema", cell))),
    }
}

/// [`GameStore`] persisted in a SQLite file.
///
/// One connection is shared behind a mutex, so `":memory:"` behaves like a
/// real database for the lifetime of the store.
pub struct SqliteStore {
    path: String,
    conn: Mutex<SqliteConnection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or a migration fails.
    #[instrument(skip(path), fields(path = %path.as_ref()))]
    pub fn open(path: impl AsRef<str>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_string();
        info!(path = %path, "Opening SQLite store");
        let mut conn = SqliteConnection::establish(&path)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::backend(format!("Migrations failed: {}", e)))?;
        debug!("Migrations applied");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if migrations fail.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn connection(&self) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::backend("SQLite connection lock poisoned"))
    }
}

impl GameStore for SqliteStore {
    #[instrument(skip(self))]
    fn get_game(&self, id: &str) -> Result<Game, StoreError> {
        let mut conn = self.connection()?;
        let row = schema::games::table
            .find(id)
            .select(GameRow::as_select())
            .first::<GameRow>(&mut *conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(format!("Game '{}'", id)))?;
        row.into_game()
    }

    #[instrument(skip(self, game), fields(game_id = %game.id))]
    fn insert_game(&self, game: &Game) -> Result<(), StoreError> {
        let row = GameRow::from_game(game)?;
        let mut conn = self.connection()?;
        diesel::insert_into(schema::games::table)
            .values(&row)
            .execute(&mut *conn)?;
        debug!("Game inserted");
        Ok(())
    }

    #[instrument(skip(self, game), fields(game_id = %game.id, state = %game.state))]
    fn update_game(&self, game: &Game) -> Result<(), StoreError> {
        let row = GameRow::from_game(game)?;
        let mut conn = self.connection()?;
        let count = diesel::update(schema::games::table.find(&row.id))
            .set((
                schema::games::state.eq(&row.state),
                schema::games::board.eq(&row.board),
            ))
            .execute(&mut *conn)?;
        if count == 0 {
            return Err(StoreError::not_found(format!("Game '{}'", game.id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn get_player(&self, id: PlayerId) -> Result<Player, StoreError> {
        let mut conn = self.connection()?;
        let row = schema::players::table
            .find(id)
            .select(PlayerRow::as_select())
            .first::<PlayerRow>(&mut *conn)
            .optional()?
            .ok_or_else(|| StoreError::not_found(format!("Player {}", id)))?;
        row.into_player()
    }

    #[instrument(skip(self, player), fields(game_id = %player.game_id, role = %player.role))]
    fn insert_player(&self, player: NewPlayer) -> Result<Player, StoreError> {
        let mut conn = self.connection()?;
        let row = diesel::insert_into(schema::players::table)
            .values(&NewPlayerRow {
                game_id: &player.game_id,
                role: player.role.as_ref(),
                pending_move: NO_MOVE,
            })
            .returning(PlayerRow::as_returning())
            .get_result::<PlayerRow>(&mut *conn)?;
        debug!(player_id = row.id, "Player inserted");
        row.into_player()
    }

    #[instrument(skip(self, player), fields(player_id = player.id))]
    fn update_player(&self, player: &Player) -> Result<(), StoreError> {
        let pending = encode_move(player.pending_move)?;
        let mut conn = self.connection()?;
        let count = diesel::update(schema::players::table.find(player.id))
            .set((
                schema::players::game_id.eq(&player.game_id),
                schema::players::role.eq(player.role.as_ref()),
                schema::players::pending_move.eq(pending),
            ))
            .execute(&mut *conn)?;
        if count == 0 {
            return Err(StoreError::not_found(format!("Player {}", player.id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn players_in_game(&self, game_id: &str) -> Result<Vec<Player>, StoreError> {
        let mut conn = self.connection()?;
        let rows = schema::players::table
            .filter(schema::players::game_id.eq(game_id))
            .order(schema::players::id.asc())
            .select(PlayerRow::as_select())
            .load::<PlayerRow>(&mut *conn)?;
        debug!(count = rows.len(), "Players loaded");
        rows.into_iter().map(PlayerRow::into_player).collect()
    }
}
