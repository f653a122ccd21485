//! Simulturn - session broker and turn engine for simultaneous-move games
//!
//! One host and any number of players attach to a game over WebSockets.
//! Players submit moves independently; once every connected player has
//! moved, the round is resolved in one step and the new board is pushed to
//! everyone.
//!
//! # Architecture
//!
//! - **Registry**: which host and player endpoints of each game are reachable
//! - **Broker**: delivery to one endpoint or fan-out to all players
//! - **Engine**: game state transitions, pending moves, round resolution
//! - **Router**: per-origin dispatch of typed messages to handlers
//! - **Connection**: listener plus driver loop for one participant
//! - **Store**: games and players in SQLite (diesel) or memory
//!
//! # Example
//!
//! ```no_run
//! use simulturn::{AppState, MemoryStore, ServerConfig, serve};
//! use simulturn_board::SimultaneousClaim;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default().with_database(None);
//! let state = AppState::build(
//!     &config,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SimultaneousClaim::tic_tac_toe()),
//! );
//! serve(&config, state).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod broker;
mod config;
mod connection;
mod engine;
mod protocol;
mod registry;
mod router;
mod server;
mod service;
mod store;

// Crate-level exports - Configuration
pub use config::{ConfigError, ServerConfig};

// Crate-level exports - Session registry and delivery
pub use broker::{Broker, BrokerError};
pub use registry::{
    ConnectionId, EndpointSet, HostReconnectPolicy, Mailbox, RegistryError, SessionRegistry,
};

// Crate-level exports - Turn engine
pub use engine::{RoundOutcome, TurnEngine, TurnError};

// Crate-level exports - Wire protocol
pub use protocol::{Inbound, Message, MessageKind, PlayerSummary, ProtocolError, decode};

// Crate-level exports - Routing and connections
pub use connection::{
    ConnectionError, ReplySink, TransportError, run_host, run_player, serve_connection,
    spawn_listener,
};
pub use router::{Dispatch, MessageRouter, Origin, Participant, RouterError};

// Crate-level exports - Game service and HTTP surface
pub use server::{AppState, CreatedGame, JoinRequest, JoinedGame, app, serve};
pub use service::{GameService, ServiceError};

// Crate-level exports - Storage
pub use store::{
    Game, GameId, GameState, GameStore, MemoryStore, NewPlayer, Player, Role, SqliteStore,
    StoreError, StoreErrorKind,
};
