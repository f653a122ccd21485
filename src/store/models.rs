//! Game and player records.

use derive_new::new;
use serde::{Deserialize, Serialize};
use simulturn_board::{Board, PlayerId};
use tracing::instrument;

/// Opaque game identifier (a UUID string in practice).
pub type GameId = String;

/// Lifecycle state of a game.
///
/// Only `Lobby` and `InProgress` carry meaning for the turn engine. Any
/// other state the host sends is kept verbatim so host workflows can add
/// states without a server change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GameState {
    /// Waiting for the host to start. Wire value `"lobby"`.
    Lobby,
    /// Rounds are being played. Wire value `"start"`.
    InProgress,
    /// Any other host-defined state.
    Other(String),
}

impl GameState {
    /// Wire / storage representation.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Lobby => "lobby",
            Self::InProgress => "start",
            Self::Other(s) => s,
        }
    }

    /// Parses the wire representation. Unknown values become [`GameState::Other`].
    #[instrument]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "lobby" => Self::Lobby,
            "start" => Self::InProgress,
            other => Self::Other(other.to_string()),
        }
    }

    /// True while rounds are being played.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl From<String> for GameState {
    fn from(value: String) -> Self {
        Self::from_wire(&value)
    }
}

impl From<GameState> for String {
    fn from(state: GameState) -> Self {
        state.as_wire().to_string()
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A participant's role in a game.
///
/// Games may name their roles differently in the UI; the broker only
/// distinguishes the host from everyone else.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Not yet given a role.
    Unassigned,
    /// Controls game state.
    Host,
    /// Submits moves each round.
    Participant,
}

impl Role {
    /// True for the host.
    pub fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }
}

/// A stored game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    /// Game id.
    pub id: GameId,
    /// Lifecycle state.
    pub state: GameState,
    /// Current board; `None` until the game first starts.
    pub board: Option<Board>,
}

impl Game {
    /// A fresh game waiting in the lobby.
    pub fn lobby(id: GameId) -> Self {
        Self {
            id,
            state: GameState::Lobby,
            board: None,
        }
    }
}

/// A stored player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Storage-assigned id.
    pub id: PlayerId,
    /// Game this player currently belongs to.
    pub game_id: GameId,
    /// Role in that game.
    pub role: Role,
    /// Cell chosen for the current round, if any.
    pub pending_move: Option<usize>,
}

/// A player row to insert; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct NewPlayer {
    /// Game to join.
    pub game_id: GameId,
    /// Role in that game.
    pub role: Role,
}
