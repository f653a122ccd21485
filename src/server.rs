//! HTTP and WebSocket surface.
//!
//! A thin axum layer over [`GameService`] and the connection driver. Each
//! WebSocket is split: the read half feeds the connection's listener and
//! the write half becomes its [`ReplySink`].

use crate::config::ServerConfig;
use crate::connection::{ReplySink, TransportError, serve_connection};
use crate::engine::TurnEngine;
use crate::protocol::Message;
use crate::registry::SessionRegistry;
use crate::router::{MessageRouter, Participant};
use crate::service::{GameService, ServiceError};
use crate::store::GameStore;
use crate::Broker;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use simulturn_board::{PlayerId, RoundPolicy};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument};

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    service: GameService,
    router: Arc<MessageRouter>,
}

impl AppState {
    /// Wires registry, broker, engine, router, and service over `store`.
    #[instrument(skip(config, store, policy))]
    pub fn build(
        config: &ServerConfig,
        store: Arc<dyn GameStore>,
        policy: Arc<dyn RoundPolicy>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(*config.host_reconnect()));
        let engine = Arc::new(TurnEngine::new(Arc::clone(&store), policy));
        let router = Arc::new(MessageRouter::new(
            Broker::new(Arc::clone(&registry)),
            engine,
            Arc::clone(&store),
        ));
        let service = GameService::new(store, registry);
        info!("Application state ready");
        Self { service, router }
    }

    /// The game service.
    pub fn service(&self) -> &GameService {
        &self.service
    }

    /// The message router.
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }
}

/// Response to `POST /games`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGame {
    /// New game id.
    pub game_id: String,
    /// Id of the game's host player.
    pub player_id: PlayerId,
}

/// Body of `POST /games/{id}/players`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Id from an earlier session, to rejoin as the same player.
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

/// Response to `POST /games/{id}/players`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedGame {
    /// Player id to connect with.
    pub player_id: PlayerId,
    /// True if this player hosts the game.
    pub host: bool,
}

/// Query of the WebSocket route.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    /// Player id to connect as.
    pub player_id: PlayerId,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownGame { .. } | Self::UnknownPlayer { .. } => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the axum router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/games", post(create_game))
        .route("/games/{game_id}/players", post(join_game))
        .route("/games/{game_id}/ws", get(ws_handler))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(state)
}

/// Binds `config.bind_addr()` and serves until the listener fails.
///
/// # Errors
///
/// Returns the I/O error from binding or serving.
#[instrument(skip(config, state))]
pub async fn serve(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), "Server listening");
    axum::serve(listener, app(state)).await
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let games = state.router.registry().game_count().await;
    Json(serde_json::json!({ "status": "ok", "games": games }))
}

#[instrument(skip(state))]
async fn create_game(State(state): State<AppState>) -> Result<Json<CreatedGame>, ServiceError> {
    let (game, host) = state.service.create_game().await?;
    Ok(Json(CreatedGame {
        game_id: game.id,
        player_id: host.id,
    }))
}

#[instrument(skip(state, request))]
async fn join_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinedGame>, ServiceError> {
    let player = state.service.connect(&game_id, request.player_id).await?;
    Ok(Json(JoinedGame {
        player_id: player.id,
        host: player.role.is_host(),
    }))
}

#[instrument(skip(ws, state))]
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ServiceError> {
    let (game, player) = state.service.lookup(&game_id, query.player_id)?;
    let who = Participant::new(game.id, player.id, player.role);
    info!(role = %who.role, "WebSocket upgrade");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, who)))
}

/// Write half of a WebSocket as a [`ReplySink`].
struct WsSink(SplitSink<WebSocket, WsMessage>);

#[async_trait]
impl ReplySink for WsSink {
    async fn reply(&mut self, message: Message) -> Result<(), TransportError> {
        let text = message.encode()?;
        self.0
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, who: Participant) {
    let (sender, receiver) = socket.split();
    let frames = receiver.filter_map(|frame| async move {
        match frame {
            Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
            Ok(WsMessage::Close(_)) => Some(Err("closed by peer".to_string())),
            Ok(_) => None,
            Err(e) => Some(Err(e.to_string())),
        }
    });

    let mut sink = WsSink(sender);
    let result = serve_connection(Arc::clone(&state.router), who, frames, &mut sink).await;
    debug!(ok = result.is_ok(), "WebSocket session finished");
    if let Err(e) = sink.0.close().await {
        debug!(error = %e, "WebSocket already closed");
    }
}
