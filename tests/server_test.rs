//! Tests for the HTTP routes and the game service.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use simulturn::{
    AppState, CreatedGame, JoinedGame, MemoryStore, ServerConfig, ServiceError, app,
};
use simulturn_board::SimultaneousClaim;
use std::sync::Arc;
use tower::ServiceExt;

fn setup_state() -> AppState {
    AppState::build(
        &ServerConfig::default().with_database(None),
        Arc::new(MemoryStore::new()),
        Arc::new(SimultaneousClaim::tic_tac_toe()),
    )
}

async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app(state.clone())
        .oneshot(request)
        .await
        .expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Body read failed");
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Valid request")
}

#[tokio::test]
async fn test_health() {
    let state = setup_state();
    let (status, body) = call(
        &state,
        Request::get("/health").body(Body::empty()).expect("Valid request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["games"], 0);
}

#[tokio::test]
async fn test_create_then_join() {
    let state = setup_state();
    let (status, body) = call(
        &state,
        Request::post("/games").body(Body::empty()).expect("Valid request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created: CreatedGame = serde_json::from_value(body).expect("CreatedGame shape");

    let (status, body) = call(
        &state,
        post_json(
            &format!("/games/{}/players", created.game_id),
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let joined: JoinedGame = serde_json::from_value(body).expect("JoinedGame shape");
    assert!(!joined.host);
    assert_ne!(joined.player_id, created.player_id);

    // Rejoining with the host's id gives back the host.
    let (_, body) = call(
        &state,
        post_json(
            &format!("/games/{}/players", created.game_id),
            serde_json::json!({ "player_id": created.player_id }),
        ),
    )
    .await;
    let rejoined: JoinedGame = serde_json::from_value(body).expect("JoinedGame shape");
    assert!(rejoined.host);
    assert_eq!(rejoined.player_id, created.player_id);
}

#[tokio::test]
async fn test_join_unknown_game_is_404() {
    let state = setup_state();
    let (status, body) = call(
        &state,
        post_json("/games/missing/players", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_returning_player_moves_between_games() {
    let state = setup_state();
    let service = state.service();
    let (first, _) = service.create_game().await.expect("Create failed");
    let (second, _) = service.create_game().await.expect("Create failed");

    let player = service.connect(&first.id, None).await.expect("Admit failed");
    let moved = service
        .connect(&second.id, Some(player.id))
        .await
        .expect("Rejoin failed");
    assert_eq!(moved.id, player.id);
    assert_eq!(moved.game_id, second.id);
    assert_eq!(moved.pending_move, None);

    assert!(matches!(
        service.lookup(&first.id, player.id),
        Err(ServiceError::UnknownPlayer { .. })
    ));
    service
        .lookup(&second.id, player.id)
        .expect("Lookup in new game failed");
}

#[tokio::test]
async fn test_unknown_returning_id_creates_player() {
    let state = setup_state();
    let service = state.service();
    let (game, _) = service.create_game().await.expect("Create failed");
    let player = service
        .connect(&game.id, Some(999))
        .await
        .expect("Admit failed");
    assert_ne!(player.id, 999);
}

#[tokio::test]
async fn test_other_games_host_is_not_moved() {
    let state = setup_state();
    let service = state.service();
    let (first, host) = service.create_game().await.expect("Create failed");
    let (second, _) = service.create_game().await.expect("Create failed");

    let player = service
        .connect(&second.id, Some(host.id))
        .await
        .expect("Admit failed");
    assert_ne!(player.id, host.id);
    assert_eq!(player.game_id, second.id);
    assert!(!player.role.is_host());

    // The first game keeps its host and can still be hosted.
    let (_, kept) = service
        .lookup(&first.id, host.id)
        .expect("Host lookup failed");
    assert!(kept.role.is_host());
}
