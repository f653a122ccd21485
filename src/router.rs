//! Dispatch of inbound messages by origin and type.
//!
//! Each connection sees two sources: its own web UI and its broker
//! mailbox. Together with the participant's role that gives four origins,
//! each with a fixed set of message types it handles:
//!
//! | origin             | handled types        |
//! |--------------------|----------------------|
//! | host, from web     | `state`              |
//! | host, from player  | `join`, `leave`, `move` |
//! | player, from web   | `move`               |
//! | player, from host  | `update`             |
//!
//! Anything else is reported as [`Dispatch::Unhandled`] and the connection
//! carries on. Handlers only fail on storage or transport errors, which the
//! connection treats as terminal.

use crate::broker::{Broker, BrokerError};
use crate::connection::{ReplySink, TransportError};
use crate::engine::{RoundOutcome, TurnEngine, TurnError};
use crate::protocol::{Message, MessageKind};
use crate::store::{GameId, GameState, GameStore, Role, StoreError};
use crate::SessionRegistry;
use derive_more::{Display, From};
use derive_new::new;
use simulturn_board::PlayerId;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Where an inbound message came from, relative to the connection
/// handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Origin {
    /// The host's web UI.
    HostFromWeb,
    /// A player connection, through the host's mailbox.
    HostFromPlayer,
    /// The player's web UI.
    PlayerFromWeb,
    /// The host connection, through the player's mailbox.
    PlayerFromHost,
}

impl Origin {
    /// Message types with a handler for this origin.
    pub fn handled_kinds(self) -> &'static [MessageKind] {
        match self {
            Self::HostFromWeb => &[MessageKind::State],
            Self::HostFromPlayer => {
                &[MessageKind::Join, MessageKind::Leave, MessageKind::Move]
            }
            Self::PlayerFromWeb => &[MessageKind::Move],
            Self::PlayerFromHost => &[MessageKind::Update],
        }
    }

    /// True if `kind` has a handler for this origin.
    pub fn handles(self, kind: MessageKind) -> bool {
        self.handled_kinds().contains(&kind)
    }
}

/// The connection a message is being handled for.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Participant {
    /// Game the connection belongs to.
    pub game_id: GameId,
    /// Player id of the connection (the host has one too).
    pub player_id: PlayerId,
    /// Host or not.
    pub role: Role,
}

/// Outcome of [`MessageRouter::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran.
    Handled,
    /// No handler for this type from this origin.
    Unhandled(MessageKind),
}

/// Handler failures. Both close the connection.
#[derive(Debug, Clone, Display, From)]
pub enum RouterError {
    /// Storage failed.
    #[display("{}", _0)]
    Store(StoreError),
    /// Writing to the participant's own UI failed.
    #[display("Reply failed: {}", _0)]
    Reply(TransportError),
}

impl std::error::Error for RouterError {}

/// Splits engine errors into the terminal ones (storage) and the ones a
/// handler logs and moves past.
fn recover<T>(result: Result<T, TurnError>) -> Result<Option<T>, RouterError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(TurnError::Store(e)) => Err(RouterError::Store(e)),
        Err(e) => {
            warn!(error = %e, "Request rejected");
            Ok(None)
        }
    }
}

/// Routes messages to handlers that drive the [`TurnEngine`] and the
/// [`Broker`].
#[derive(Debug)]
pub struct MessageRouter {
    broker: Broker,
    engine: Arc<TurnEngine>,
    store: Arc<dyn GameStore>,
}

impl MessageRouter {
    /// Creates a router.
    pub fn new(broker: Broker, engine: Arc<TurnEngine>, store: Arc<dyn GameStore>) -> Self {
        Self {
            broker,
            engine,
            store,
        }
    }

    /// The broker handlers send through.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// The registry behind the broker.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.broker.registry()
    }

    /// The turn engine.
    pub fn engine(&self) -> &Arc<TurnEngine> {
        &self.engine
    }

    /// The storage collaborator.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Runs the handler for `message` arriving from `origin` on `who`'s
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] on storage or reply failure.
    #[instrument(
        skip(self, who, message, sink),
        fields(game_id = %who.game_id, player_id = who.player_id, kind = %message.kind())
    )]
    pub async fn dispatch(
        &self,
        origin: Origin,
        who: &Participant,
        message: Message,
        sink: &mut dyn ReplySink,
    ) -> Result<Dispatch, RouterError> {
        let kind = message.kind();
        if !origin.handles(kind) {
            debug!("No handler");
            return Ok(Dispatch::Unhandled(kind));
        }

        match (origin, message) {
            (Origin::HostFromWeb, Message::State { state }) => {
                self.host_state(who, state, sink).await?
            }
            (Origin::HostFromPlayer, Message::Join | Message::Leave) => {
                self.host_roster(who, kind, sink).await?
            }
            (Origin::HostFromPlayer, Message::Move { .. }) => {
                self.publish_round(who, sink).await?
            }
            (Origin::PlayerFromWeb, Message::Move { cell }) => self.player_move(who, cell).await?,
            (Origin::PlayerFromHost, update @ Message::Update { .. }) => {
                debug!("Forwarding to player UI");
                sink.reply(update).await?
            }
            _ => return Ok(Dispatch::Unhandled(kind)),
        }
        Ok(Dispatch::Handled)
    }

    /// Host UI changed the game state: apply it, then push the snapshot to
    /// every player and back to the host UI.
    async fn host_state(
        &self,
        who: &Participant,
        state: GameState,
        sink: &mut dyn ReplySink,
    ) -> Result<(), RouterError> {
        info!(state = %state, "Host requested state change");
        let Some(game) = recover(self.engine.change_state(&who.game_id, state).await)? else {
            return Ok(());
        };
        let update = Message::update(game.board, game.state);
        let delivered = self
            .broker
            .broadcast_to_players(&who.game_id, update.clone())
            .await;
        debug!(delivered, "State pushed to players");
        sink.reply(update).await?;
        Ok(())
    }

    /// A player came or went: refresh the host UI's roster. A departure can
    /// unblock a round, so check it.
    async fn host_roster(
        &self,
        who: &Participant,
        kind: MessageKind,
        sink: &mut dyn ReplySink,
    ) -> Result<(), RouterError> {
        debug!(event = %kind, "Refreshing roster");
        let players = self.store.players_in_game(&who.game_id)?;
        sink.reply(Message::players(&players)).await?;

        if kind == MessageKind::Leave {
            self.publish_round(who, sink).await?;
        }
        Ok(())
    }

    /// Resolves the round if it is ready and publishes the new board.
    async fn publish_round(
        &self,
        who: &Participant,
        sink: &mut dyn ReplySink,
    ) -> Result<(), RouterError> {
        let connected = self.registry().connected_players(&who.game_id).await;
        let outcome = match self
            .engine
            .try_resolve_round(&who.game_id, &connected)
            .await
        {
            Err(TurnError::InvalidState { state, .. }) => {
                debug!(state = %state, "Game not in progress, no round to resolve");
                return Ok(());
            }
            other => recover(other)?,
        };

        match outcome {
            Some(RoundOutcome::Resolved(board)) => {
                let update = Message::update(Some(board), GameState::InProgress);
                let delivered = self
                    .broker
                    .broadcast_to_players(&who.game_id, update.clone())
                    .await;
                info!(delivered, "Round published");
                sink.reply(update).await?;
            }
            Some(RoundOutcome::Waiting) => debug!("Waiting on other players"),
            None => {}
        }
        Ok(())
    }

    /// Player UI chose a cell: record it and nudge the host to try the
    /// round.
    async fn player_move(&self, who: &Participant, cell: usize) -> Result<(), RouterError> {
        if recover(
            self.engine
                .submit_move(&who.game_id, who.player_id, cell)
                .await,
        )?
        .is_none()
        {
            return Ok(());
        }

        match self
            .broker
            .send_to_host(&who.game_id, Message::Move { cell })
            .await
        {
            Ok(()) => debug!(cell, "Move sent to host"),
            Err(e @ BrokerError::HostUnreachable { .. }) => {
                warn!(error = %e, "Move recorded; round will be checked when the host returns")
            }
            Err(e) => warn!(error = %e, "Move notification failed"),
        }
        Ok(())
    }

    /// Host connection opened: bring the host UI up to date.
    ///
    /// In the lobby the UI gets the roster and the state; otherwise it gets
    /// the board, and a round that became ready while the host was away is
    /// resolved.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] on storage or reply failure.
    #[instrument(skip(self, who, sink), fields(game_id = %who.game_id, player_id = who.player_id))]
    pub async fn host_connected(
        &self,
        who: &Participant,
        sink: &mut dyn ReplySink,
    ) -> Result<(), RouterError> {
        let game = self.store.get_game(&who.game_id)?;
        info!(state = %game.state, "Host connected");

        if game.state == GameState::Lobby {
            let players = self.store.players_in_game(&who.game_id)?;
            debug!(count = players.len(), "Sending lobby roster");
            sink.reply(Message::players(&players)).await?;
            sink.reply(Message::State { state: game.state }).await?;
            return Ok(());
        }

        let in_progress = game.state.is_in_progress();
        sink.reply(Message::update(game.board, game.state)).await?;
        if in_progress {
            self.publish_round(who, sink).await?;
        }
        Ok(())
    }

    /// Player connection about to register: clear its pending move.
    ///
    /// Runs before the player becomes reachable, so a round resolved by
    /// the host can never count it with a move left from an earlier
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Store`] on storage failure.
    #[instrument(skip(self, who), fields(game_id = %who.game_id, player_id = who.player_id))]
    pub async fn player_joining(&self, who: &Participant) -> Result<(), RouterError> {
        recover(
            self.engine
                .reset_pending(&who.game_id, who.player_id)
                .await,
        )?;
        Ok(())
    }

    /// Player connection opened: show it the board and tell the host.
    ///
    /// The board is only sent while the game is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] on storage or reply failure.
    #[instrument(skip(self, who, sink), fields(game_id = %who.game_id, player_id = who.player_id))]
    pub async fn player_connected(
        &self,
        who: &Participant,
        sink: &mut dyn ReplySink,
    ) -> Result<(), RouterError> {
        let game = self.store.get_game(&who.game_id)?;
        info!(state = %game.state, "Player connected");
        let board = game.board.filter(|_| game.state.is_in_progress());
        sink.reply(Message::update(board, game.state)).await?;

        if let Err(e) = self.broker.send_to_host(&who.game_id, Message::Join).await {
            debug!(error = %e, "Host not told about join");
        }
        Ok(())
    }

    /// Player connection closed: tell the host.
    #[instrument(skip(self, who), fields(game_id = %who.game_id, player_id = who.player_id))]
    pub async fn player_disconnected(&self, who: &Participant) {
        info!("Player disconnected");
        if let Err(e) = self.broker.send_to_host(&who.game_id, Message::Leave).await {
            debug!(error = %e, "Host not told about leave");
        }
    }
}
