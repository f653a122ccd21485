//! One participant connection: a listener task feeding a driver loop.
//!
//! The listener reads text frames from the transport, decodes them, and
//! hands them to the driver over a channel. The driver waits on that
//! channel and on the participant's broker mailbox at the same time and
//! dispatches whichever arrives first. When either source ends, or a handler
//! fails terminally, the driver deregisters the participant.

use crate::protocol::{Inbound, Message, ProtocolError, decode};
use crate::registry::{Mailbox, RegistryError};
use crate::router::{Dispatch, MessageRouter, Origin, Participant, RouterError};
use async_trait::async_trait;
use derive_more::{Display, From};
use futures::{Stream, StreamExt};
use std::fmt::Display as FmtDisplay;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Frames buffered between listener and driver.
const INBOUND_BUFFER: usize = 32;

/// Failure writing to a participant's own UI.
#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum TransportError {
    /// The UI side is gone.
    #[display("Connection closed")]
    #[from(skip)]
    Closed,

    /// The transport refused the frame.
    #[display("Send failed: {}", _0)]
    #[from(skip)]
    Send(String),

    /// The message could not be serialized.
    #[display("{}", _0)]
    Encode(ProtocolError),
}

impl std::error::Error for TransportError {}

/// Why a connection ended abnormally.
#[derive(Debug, Clone, Display, From)]
pub enum ConnectionError {
    /// Registration was refused.
    #[display("{}", _0)]
    Registry(RegistryError),

    /// A handler failed terminally.
    #[display("{}", _0)]
    Router(RouterError),
}

impl std::error::Error for ConnectionError {}

/// Where replies to the participant's own UI go.
#[async_trait]
pub trait ReplySink: Send {
    /// Writes one message to the UI.
    async fn reply(&mut self, message: Message) -> Result<(), TransportError>;
}

#[async_trait]
impl ReplySink for mpsc::UnboundedSender<Message> {
    async fn reply(&mut self, message: Message) -> Result<(), TransportError> {
        self.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Spawns the task that turns raw text frames into [`Inbound`] values.
///
/// Malformed frames are logged and dropped. The task ends when the frame
/// stream ends or errors, or when the driver stops listening.
pub fn spawn_listener<S, E>(frames: S, inbound: mpsc::Sender<Inbound>) -> JoinHandle<()>
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: FmtDisplay + Send + 'static,
{
    tokio::spawn(async move {
        let mut frames = Box::pin(frames);
        while let Some(frame) = frames.next().await {
            let text = match frame {
                Ok(text) => text,
                Err(e) => {
                    debug!(error = %e, "Transport read failed");
                    break;
                }
            };
            match decode(&text) {
                Ok(decoded) => {
                    if inbound.send(decoded).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Dropping malformed frame"),
            }
        }
        debug!("Listener finished");
    })
}

async fn route(
    router: &MessageRouter,
    origin: Origin,
    who: &Participant,
    inbound: Inbound,
    sink: &mut dyn ReplySink,
) -> Result<(), ConnectionError> {
    match inbound {
        Inbound::Unknown(kind) => {
            debug!(origin = %origin, kind = %kind, "Ignoring unknown message type");
        }
        Inbound::Message(message) => {
            if let Dispatch::Unhandled(kind) = router.dispatch(origin, who, message, sink).await? {
                debug!(origin = %origin, kind = %kind, "Ignoring unhandled message");
            }
        }
    }
    Ok(())
}

async fn host_session(
    router: &MessageRouter,
    who: &Participant,
    web: &mut mpsc::Receiver<Inbound>,
    mailbox: &mut Mailbox,
    sink: &mut dyn ReplySink,
) -> Result<(), ConnectionError> {
    router.host_connected(who, sink).await?;
    loop {
        tokio::select! {
            inbound = web.recv() => match inbound {
                Some(inbound) => route(router, Origin::HostFromWeb, who, inbound, sink).await?,
                None => {
                    info!("Host UI disconnected");
                    return Ok(());
                }
            },
            message = mailbox.recv() => match message {
                Some(message) => {
                    let inbound = Inbound::Message(message);
                    route(router, Origin::HostFromPlayer, who, inbound, sink).await?
                }
                None => {
                    info!("Host mailbox closed, connection replaced");
                    return Ok(());
                }
            },
        }
    }
}

async fn player_session(
    router: &MessageRouter,
    who: &Participant,
    web: &mut mpsc::Receiver<Inbound>,
    mailbox: &mut Mailbox,
    sink: &mut dyn ReplySink,
) -> Result<(), ConnectionError> {
    router.player_connected(who, sink).await?;
    loop {
        tokio::select! {
            inbound = web.recv() => match inbound {
                Some(inbound) => route(router, Origin::PlayerFromWeb, who, inbound, sink).await?,
                None => {
                    info!("Player UI disconnected");
                    return Ok(());
                }
            },
            message = mailbox.recv() => match message {
                Some(message) => {
                    let inbound = Inbound::Message(message);
                    route(router, Origin::PlayerFromHost, who, inbound, sink).await?
                }
                None => {
                    info!("Player mailbox closed, connection replaced");
                    return Ok(());
                }
            },
        }
    }
}

/// Drives a host connection until its UI or mailbox closes.
///
/// # Errors
///
/// Returns [`ConnectionError::Registry`] if the host is refused, or
/// [`ConnectionError::Router`] if a handler failed terminally. The host is
/// deregistered either way.
#[instrument(
    skip(router, who, web, sink),
    fields(game_id = %who.game_id, player_id = who.player_id)
)]
pub async fn run_host(
    router: Arc<MessageRouter>,
    who: Participant,
    mut web: mpsc::Receiver<Inbound>,
    sink: &mut dyn ReplySink,
) -> Result<(), ConnectionError> {
    let mut mailbox = router.registry().host_join(&who.game_id).await?;
    let result = host_session(&router, &who, &mut web, &mut mailbox, sink).await;
    router
        .registry()
        .host_leave(&who.game_id, mailbox.connection())
        .await;
    result
}

/// Drives a player connection until its UI or mailbox closes.
///
/// Its pending move is cleared before it is registered. On exit the
/// player is deregistered and, unless a newer connection for the same
/// player already took over, the host is told it left.
///
/// # Errors
///
/// Returns [`ConnectionError::Router`] if a handler failed terminally.
#[instrument(
    skip(router, who, web, sink),
    fields(game_id = %who.game_id, player_id = who.player_id)
)]
pub async fn run_player(
    router: Arc<MessageRouter>,
    who: Participant,
    mut web: mpsc::Receiver<Inbound>,
    sink: &mut dyn ReplySink,
) -> Result<(), ConnectionError> {
    router.player_joining(&who).await?;
    let mut mailbox = router
        .registry()
        .player_join(&who.game_id, who.player_id)
        .await;
    let result = player_session(&router, &who, &mut web, &mut mailbox, sink).await;
    let removed = router
        .registry()
        .player_leave(&who.game_id, who.player_id, mailbox.connection())
        .await;
    if removed {
        router.player_disconnected(&who).await;
    }
    result
}

/// Runs a whole connection: spawns the listener over `frames` and drives
/// the host or player loop according to `who.role`.
#[instrument(
    skip(router, frames, sink),
    fields(game_id = %who.game_id, player_id = who.player_id, role = %who.role)
)]
pub async fn serve_connection<S, E>(
    router: Arc<MessageRouter>,
    who: Participant,
    frames: S,
    sink: &mut dyn ReplySink,
) -> Result<(), ConnectionError>
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: FmtDisplay + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
    let listener = spawn_listener(frames, tx);

    let result = if who.role.is_host() {
        run_host(router, who, rx, sink).await
    } else {
        run_player(router, who, rx, sink).await
    };

    listener.abort();
    match &result {
        Ok(()) => info!("Connection closed"),
        Err(e) => error!(error = %e, "Connection terminated"),
    }
    result
}
