//! Message delivery between the endpoints of a game.

use crate::SessionRegistry;
use crate::protocol::Message;
use crate::store::GameId;
use derive_more::Display;
use simulturn_board::PlayerId;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Delivery failures. Never fatal to the broker; callers log and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum BrokerError {
    /// No host mailbox is registered for the game.
    #[display("Host of game '{}' is not connected", game_id)]
    HostUnreachable {
        /// Game id.
        game_id: GameId,
    },
    /// The player has no mailbox in the game.
    #[display("Player {} of game '{}' is not connected", player_id, game_id)]
    PlayerUnreachable {
        /// Game id.
        game_id: GameId,
        /// Player id.
        player_id: PlayerId,
    },
}

impl std::error::Error for BrokerError {}

/// Sends messages to registered endpoints.
///
/// Mailboxes are unbounded queues, so a send never waits on the receiving
/// connection. Two connections sending to each other can not deadlock, and
/// messages to one endpoint arrive in send order.
#[derive(Debug, Clone)]
pub struct Broker {
    registry: Arc<SessionRegistry>,
}

impl Broker {
    /// Creates a broker over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broker delivers through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Delivers `message` to the host of `game_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::HostUnreachable`] if no host is registered or
    /// its connection is already gone.
    #[instrument(skip(self, message), fields(kind = %message.kind()))]
    pub async fn send_to_host(&self, game_id: &str, message: Message) -> Result<(), BrokerError> {
        let delivered = self
            .registry
            .with_game(game_id, |set| {
                set.and_then(|s| s.host())
                    .is_some_and(|host| host.deliver(message))
            })
            .await;
        if delivered {
            debug!("Delivered to host");
            Ok(())
        } else {
            Err(BrokerError::HostUnreachable {
                game_id: game_id.to_string(),
            })
        }
    }

    /// Delivers `message` to one player.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PlayerUnreachable`] if the player is not
    /// registered or its connection is already gone.
    #[instrument(skip(self, message), fields(kind = %message.kind()))]
    pub async fn send_to_player(
        &self,
        game_id: &str,
        player_id: PlayerId,
        message: Message,
    ) -> Result<(), BrokerError> {
        let delivered = self
            .registry
            .with_game(game_id, |set| {
                set.and_then(|s| s.player(player_id))
                    .is_some_and(|player| player.deliver(message))
            })
            .await;
        if delivered {
            debug!("Delivered to player");
            Ok(())
        } else {
            Err(BrokerError::PlayerUnreachable {
                game_id: game_id.to_string(),
                player_id,
            })
        }
    }

    /// Delivers one copy of `message` to every player registered at the
    /// moment of the call. Returns how many players received it.
    ///
    /// Players whose connection is closing are skipped.
    #[instrument(skip(self, message), fields(kind = %message.kind()))]
    pub async fn broadcast_to_players(&self, game_id: &str, message: Message) -> usize {
        let delivered = self
            .registry
            .with_game(game_id, |set| {
                let Some(set) = set else {
                    return 0;
                };
                set.players()
                    .filter(|(player_id, endpoint)| {
                        let ok = endpoint.deliver(message.clone());
                        if !ok {
                            warn!(player_id, "Skipping player whose connection is closing");
                        }
                        ok
                    })
                    .count()
            })
            .await;
        debug!(delivered, "Broadcast complete");
        delivered
    }
}
