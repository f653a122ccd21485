//! Persistence collaborator for games and players.
//!
//! The broker core only needs simple get/insert/update access keyed by
//! opaque ids. [`GameStore`] is that seam; [`MemoryStore`] and
//! [`SqliteStore`] are the two backends.

mod error;
mod memory;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only
mod sqlite;

pub use error::{StoreError, StoreErrorKind};
pub use memory::MemoryStore;
pub use models::{Game, GameId, GameState, NewPlayer, Player, Role};
pub use repository::GameStore;
pub use sqlite::SqliteStore;
