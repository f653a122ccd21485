//! Which endpoints of each game are reachable right now.
//!
//! The registry is pure bookkeeping: one optional host mailbox and one
//! mailbox per connected player, keyed by game id. It knows nothing about
//! message semantics; [`Broker`](crate::Broker) does the sending.
//!
//! Every mutation takes the write lock. Sends happen under the read lock,
//! so a leave can never close a channel while a send to it is in flight.
//! Each join hands out a fresh [`ConnectionId`]; leaves must present it,
//! which keeps a stale connection's late leave from removing the entry of
//! the connection that replaced it.

use crate::protocol::Message;
use crate::store::GameId;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use simulturn_board::PlayerId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, instrument, warn};

/// Identifies one join of one endpoint.
pub type ConnectionId = u64;

/// What `host_join` does when the game already has a live host.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HostReconnectPolicy {
    /// The new connection takes over; the old host mailbox is closed.
    #[default]
    Replace,
    /// The new connection is refused with [`RegistryError::AlreadyConnected`].
    Reject,
}

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RegistryError {
    /// A live host is already attached and the policy is `Reject`.
    #[display("Game '{}' already has a connected host", game_id)]
    AlreadyConnected {
        /// Game id.
        game_id: GameId,
    },
}

impl std::error::Error for RegistryError {}

/// Sending half of one endpoint.
#[derive(Debug)]
pub(crate) struct Endpoint {
    connection: ConnectionId,
    sender: mpsc::UnboundedSender<Message>,
}

impl Endpoint {
    /// Queues `message`. Fails only if the receiving connection is gone.
    pub(crate) fn deliver(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    fn is_live(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Currently reachable endpoints of one game.
#[derive(Debug, Default)]
pub struct EndpointSet {
    host: Option<Endpoint>,
    players: BTreeMap<PlayerId, Endpoint>,
}

impl EndpointSet {
    /// True while a host mailbox is registered.
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    /// Ids of connected players, ascending.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub(crate) fn host(&self) -> Option<&Endpoint> {
        self.host.as_ref()
    }

    pub(crate) fn player(&self, id: PlayerId) -> Option<&Endpoint> {
        self.players.get(&id)
    }

    pub(crate) fn players(&self) -> impl Iterator<Item = (PlayerId, &Endpoint)> {
        self.players.iter().map(|(id, endpoint)| (*id, endpoint))
    }
}

/// Receiving half handed to the connection that joined.
///
/// Yields `None` once the registry has dropped the matching entry, either
/// through a leave or because a newer connection replaced it.
#[derive(Debug)]
pub struct Mailbox {
    connection: ConnectionId,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Mailbox {
    /// The join this mailbox belongs to; pass it back when leaving.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Waits for the next message. FIFO per mailbox.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

/// Map from game id to that game's [`EndpointSet`].
#[derive(Debug)]
pub struct SessionRegistry {
    games: RwLock<HashMap<GameId, EndpointSet>>,
    host_policy: HostReconnectPolicy,
    next_connection: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[instrument]
    pub fn new(host_policy: HostReconnectPolicy) -> Self {
        info!(policy = %host_policy, "Creating session registry");
        Self {
            games: RwLock::new(HashMap::new()),
            host_policy,
            next_connection: AtomicU64::new(1),
        }
    }

    /// The configured host reconnect policy.
    pub fn host_policy(&self) -> HostReconnectPolicy {
        self.host_policy
    }

    fn mailbox(&self) -> (Endpoint, Mailbox) {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Endpoint { connection, sender },
            Mailbox {
                connection,
                receiver,
            },
        )
    }

    /// Creates an empty endpoint set for `game_id` if there is none.
    #[instrument(skip(self))]
    pub async fn ensure(&self, game_id: &str) {
        let mut games = self.games.write().await;
        if !games.contains_key(game_id) {
            debug!("Creating endpoint set");
            games.insert(game_id.to_string(), EndpointSet::default());
        }
    }

    /// Registers the host of `game_id` and returns its mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyConnected`] if a live host is attached
    /// and the policy is [`HostReconnectPolicy::Reject`].
    #[instrument(skip(self))]
    pub async fn host_join(&self, game_id: &str) -> Result<Mailbox, RegistryError> {
        let mut games = self.games.write().await;
        let set = games.entry(game_id.to_string()).or_default();

        if let Some(existing) = &set.host {
            if existing.is_live() && self.host_policy == HostReconnectPolicy::Reject {
                warn!(connection = existing.connection, "Rejecting second host");
                return Err(RegistryError::AlreadyConnected {
                    game_id: game_id.to_string(),
                });
            }
            info!(replaced = existing.connection, "Replacing host connection");
        }

        let (endpoint, mailbox) = self.mailbox();
        debug!(connection = endpoint.connection, "Host joined");
        set.host = Some(endpoint);
        Ok(mailbox)
    }

    /// Removes the host entry if it still belongs to `connection`.
    ///
    /// Returns true if an entry was removed.
    #[instrument(skip(self))]
    pub async fn host_leave(&self, game_id: &str, connection: ConnectionId) -> bool {
        let mut games = self.games.write().await;
        let Some(set) = games.get_mut(game_id) else {
            return false;
        };
        match &set.host {
            Some(host) if host.connection == connection => {
                set.host = None;
                debug!("Host left");
                true
            }
            _ => {
                debug!("Host entry already replaced or gone");
                false
            }
        }
    }

    /// Registers `player_id` in `game_id`, replacing any earlier entry for
    /// the same player, and returns its mailbox.
    #[instrument(skip(self))]
    pub async fn player_join(&self, game_id: &str, player_id: PlayerId) -> Mailbox {
        let mut games = self.games.write().await;
        let set = games.entry(game_id.to_string()).or_default();
        let (endpoint, mailbox) = self.mailbox();
        if let Some(stale) = set.players.insert(player_id, endpoint) {
            info!(replaced = stale.connection, "Replacing player connection");
        }
        debug!(connection = mailbox.connection, "Player joined");
        mailbox
    }

    /// Removes the player's entry if it still belongs to `connection`.
    ///
    /// Returns true if an entry was removed.
    #[instrument(skip(self))]
    pub async fn player_leave(
        &self,
        game_id: &str,
        player_id: PlayerId,
        connection: ConnectionId,
    ) -> bool {
        let mut games = self.games.write().await;
        let Some(set) = games.get_mut(game_id) else {
            return false;
        };
        match set.players.get(&player_id) {
            Some(endpoint) if endpoint.connection == connection => {
                set.players.remove(&player_id);
                debug!("Player left");
                true
            }
            _ => {
                debug!("Player entry already replaced or gone");
                false
            }
        }
    }

    /// Ids of the players of `game_id` connected right now.
    pub async fn connected_players(&self, game_id: &str) -> Vec<PlayerId> {
        self.games
            .read()
            .await
            .get(game_id)
            .map(EndpointSet::player_ids)
            .unwrap_or_default()
    }

    /// True while `game_id` has a registered host.
    pub async fn has_host(&self, game_id: &str) -> bool {
        self.games
            .read()
            .await
            .get(game_id)
            .is_some_and(EndpointSet::has_host)
    }

    /// Number of games with an endpoint set.
    pub async fn game_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Runs `f` against the endpoint set of `game_id` under the read lock.
    ///
    /// Leaves wait for `f` to finish, so anything `f` sends cannot race a
    /// removal.
    pub(crate) async fn with_game<R>(
        &self,
        game_id: &str,
        f: impl FnOnce(Option<&EndpointSet>) -> R,
    ) -> R {
        let games = self.games.read().await;
        f(games.get(game_id))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(HostReconnectPolicy::default())
    }
}
