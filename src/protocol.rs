//! Logical messages exchanged between the web UIs and the server.
//!
//! Every message is a JSON object with a `type` discriminator. Frames are
//! validated once, here, and handlers only ever see a typed [`Message`].

use crate::store::{GameState, Player, Role};
use serde::{Deserialize, Serialize};
use simulturn_board::{Board, PlayerId};
use std::str::FromStr;
use tracing::{instrument, trace};

/// Entry in a `players` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player id.
    pub id: PlayerId,
    /// Player role.
    pub role: Role,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            role: player.role,
        }
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Host UI asks for a state change (`"lobby"`, `"start"`, ...).
    State {
        /// Requested state.
        state: GameState,
    },
    /// Board and state snapshot pushed to UIs.
    Update {
        /// Current board, absent before the first start.
        board: Option<Board>,
        /// Current game state.
        state: GameState,
    },
    /// Roster pushed to the host UI.
    Players {
        /// Everyone attached to the game.
        players: Vec<PlayerSummary>,
    },
    /// A player's chosen cell for this round.
    Move {
        /// Target cell index.
        #[serde(rename = "move")]
        cell: usize,
    },
    /// A player connected (server-side, player to host).
    Join,
    /// A player disconnected (server-side, player to host).
    Leave,
}

/// The `type` discriminator of a [`Message`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    /// `state`
    State,
    /// `update`
    Update,
    /// `players`
    Players,
    /// `move`
    Move,
    /// `join`
    Join,
    /// `leave`
    Leave,
}

impl Message {
    /// The discriminator of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::State { .. } => MessageKind::State,
            Self::Update { .. } => MessageKind::Update,
            Self::Players { .. } => MessageKind::Players,
            Self::Move { .. } => MessageKind::Move,
            Self::Join => MessageKind::Join,
            Self::Leave => MessageKind::Leave,
        }
    }

    /// Builds an `update` snapshot.
    pub fn update(board: Option<Board>, state: GameState) -> Self {
        Self::Update { board, state }
    }

    /// Builds a `players` listing.
    pub fn players<'a>(players: impl IntoIterator<Item = &'a Player>) -> Self {
        Self::Players {
            players: players.into_iter().map(PlayerSummary::from).collect(),
        }
    }

    /// Serializes to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A well-formed message of a known type.
    Message(Message),
    /// A well-formed object whose `type` nobody handles.
    Unknown(String),
}

/// Why a frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ProtocolError {
    /// Not a JSON object.
    #[display("Frame is not a JSON object: {}", _0)]
    NotJson(String),

    /// No string `type` field.
    #[display("Frame has no string 'type' field")]
    MissingType,

    /// Known type, wrong fields.
    #[display("Malformed '{}' message: {}", kind, reason)]
    Malformed {
        /// Declared type.
        kind: MessageKind,
        /// Serde's explanation.
        reason: String,
    },

    /// Outbound serialization failed.
    #[display("Failed to encode message: {}", _0)]
    Encode(String),
}

impl std::error::Error for ProtocolError {}

/// Decodes a text frame, rejecting anything whose fields do not match its
/// declared type.
///
/// # Errors
///
/// Returns [`ProtocolError`] for non-JSON, untyped, or malformed frames.
/// Unknown types are not errors; they decode to [`Inbound::Unknown`].
#[instrument(skip(text), fields(len = text.len()))]
pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::NotJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::NotJson("expected an object".to_string()));
    }
    let declared = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    let Ok(kind) = MessageKind::from_str(&declared) else {
        trace!(declared = %declared, "Unknown message type");
        return Ok(Inbound::Unknown(declared));
    };

    serde_json::from_value::<Message>(value)
        .map(Inbound::Message)
        .map_err(|e| ProtocolError::Malformed {
            kind,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_move() {
        assert_eq!(
            decode(r#"{"type":"move","move":4}"#),
            Ok(Inbound::Message(Message::Move { cell: 4 }))
        );
    }

    #[test]
    fn test_decode_state_passes_unknown_states_through() {
        assert_eq!(
            decode(r#"{"type":"state","state":"paused"}"#),
            Ok(Inbound::Message(Message::State {
                state: GameState::Other("paused".to_string())
            }))
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        assert_eq!(
            decode(r#"{"type":"chat","text":"hi"}"#),
            Ok(Inbound::Unknown("chat".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        assert!(matches!(
            decode(r#"{"type":"move","move":"four"}"#),
            Err(ProtocolError::Malformed {
                kind: MessageKind::Move,
                ..
            })
        ));
        assert!(matches!(
            decode(r#"{"type":"move","move":-1}"#),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"move"}"#),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_untyped() {
        assert_eq!(decode(r#"{"move":1}"#), Err(ProtocolError::MissingType));
        assert_eq!(decode(r#"{"type":7}"#), Err(ProtocolError::MissingType));
        assert!(matches!(decode("[1,2]"), Err(ProtocolError::NotJson(_))));
        assert!(matches!(decode("{oops"), Err(ProtocolError::NotJson(_))));
    }

    #[test]
    fn test_update_wire_shape() {
        let board = Board::try_from(vec![0, 3, 0]).expect("valid board");
        let json = Message::update(Some(board), GameState::InProgress)
            .encode()
            .expect("encodes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["type"], "update");
        assert_eq!(value["state"], "start");
        assert_eq!(value["board"], serde_json::json!([0, 3, 0]));

        let lobby = Message::update(None, GameState::Lobby).encode().expect("encodes");
        let value: serde_json::Value = serde_json::from_str(&lobby).expect("valid json");
        assert!(value["board"].is_null());
    }

    #[test]
    fn test_join_and_players_wire_shape() {
        assert_eq!(Message::Join.encode().expect("encodes"), r#"{"type":"join"}"#);
        let players = Message::Players {
            players: vec![PlayerSummary {
                id: 1,
                role: Role::Host,
            }],
        };
        assert_eq!(
            players.encode().expect("encodes"),
            r#"{"type":"players","players":[{"id":1,"role":"host"}]}"#
        );
    }
}
