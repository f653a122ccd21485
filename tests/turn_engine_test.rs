//! Tests for the turn engine state machine and round resolution.

use simulturn::{
    Game, GameState, GameStore, MemoryStore, NewPlayer, Role, RoundOutcome, TurnEngine, TurnError,
};
use simulturn_board::{Board, BoardError, Cell, PlayerId, SimultaneousClaim};
use std::sync::Arc;

struct Fixture {
    store: Arc<MemoryStore>,
    engine: TurnEngine,
    host: PlayerId,
    players: Vec<PlayerId>,
}

/// A lobby game "g1" with a host and `participants` players.
fn setup_game(participants: usize) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_game(&Game::lobby("g1".to_string()))
        .expect("Insert game failed");
    let host = store
        .insert_player(NewPlayer::new("g1".to_string(), Role::Host))
        .expect("Insert host failed")
        .id;
    let players = (0..participants)
        .map(|_| {
            store
                .insert_player(NewPlayer::new("g1".to_string(), Role::Participant))
                .expect("Insert player failed")
                .id
        })
        .collect();
    let engine = TurnEngine::new(
        Arc::clone(&store) as Arc<dyn GameStore>,
        Arc::new(SimultaneousClaim::tic_tac_toe()),
    );
    Fixture {
        store,
        engine,
        host,
        players,
    }
}

async fn start(fixture: &Fixture) {
    fixture
        .engine
        .change_state("g1", GameState::InProgress)
        .await
        .expect("Start failed");
}

fn board_of(fixture: &Fixture) -> Board {
    fixture
        .store
        .get_game("g1")
        .expect("Get game failed")
        .board
        .expect("Game has a board")
}

#[tokio::test]
async fn test_start_resets_board() {
    let fixture = setup_game(2);
    let game = fixture
        .engine
        .change_state("g1", GameState::InProgress)
        .await
        .expect("Start failed");

    assert_eq!(game.state, GameState::InProgress);
    let board = game.board.expect("Started game has a board");
    assert_eq!(board.to_wire(), vec![0; 9]);
    assert_eq!(board_of(&fixture), board);
}

#[tokio::test]
async fn test_other_states_keep_board() {
    let fixture = setup_game(1);
    start(&fixture).await;
    let a = fixture.players[0];
    fixture.engine.submit_move("g1", a, 4).await.expect("Submit failed");
    fixture
        .engine
        .try_resolve_round("g1", &[a])
        .await
        .expect("Resolve failed");

    let game = fixture
        .engine
        .change_state("g1", GameState::Other("paused".to_string()))
        .await
        .expect("State change failed");
    assert_eq!(game.state, GameState::Other("paused".to_string()));
    assert_eq!(game.board.map(|b| b.get(4)), Some(Some(Cell::Occupied(a))));
}

#[tokio::test]
async fn test_submit_in_lobby_is_invalid_state() {
    let fixture = setup_game(1);
    let err = fixture
        .engine
        .submit_move("g1", fixture.players[0], 0)
        .await
        .expect_err("Lobby rejects moves");
    assert!(matches!(
        err,
        TurnError::InvalidState {
            state: GameState::Lobby,
            ..
        }
    ));
    assert!(!err.is_terminal());
}

#[tokio::test]
async fn test_resolve_in_lobby_is_invalid_state() {
    let fixture = setup_game(1);
    assert!(matches!(
        fixture.engine.try_resolve_round("g1", &fixture.players).await,
        Err(TurnError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_conflicting_moves_cancel() {
    let fixture = setup_game(2);
    start(&fixture).await;
    let (a, b) = (fixture.players[0], fixture.players[1]);

    fixture.engine.submit_move("g1", a, 4).await.expect("Submit failed");
    fixture.engine.submit_move("g1", b, 4).await.expect("Submit failed");

    let outcome = fixture
        .engine
        .try_resolve_round("g1", &[a, b])
        .await
        .expect("Resolve failed");
    let RoundOutcome::Resolved(board) = outcome else {
        panic!("Round should resolve");
    };
    assert_eq!(board.to_wire(), vec![0; 9]);
    assert_eq!(board_of(&fixture), board);
}

#[tokio::test]
async fn test_waits_for_connected_players() {
    let fixture = setup_game(2);
    start(&fixture).await;
    let (a, b) = (fixture.players[0], fixture.players[1]);

    fixture.engine.submit_move("g1", a, 0).await.expect("Submit failed");
    let outcome = fixture
        .engine
        .try_resolve_round("g1", &[a, b])
        .await
        .expect("Resolve failed");
    assert_eq!(outcome, RoundOutcome::Waiting);
    assert_eq!(board_of(&fixture).to_wire(), vec![0; 9]);

    // The recorded move survives the failed attempt.
    let player = fixture.store.get_player(a).expect("Get player failed");
    assert_eq!(player.pending_move, Some(0));
}

#[tokio::test]
async fn test_sole_claimant_takes_cell() {
    let fixture = setup_game(2);
    start(&fixture).await;
    let (a, b) = (fixture.players[0], fixture.players[1]);

    fixture.engine.submit_move("g1", a, 2).await.expect("Submit failed");
    fixture.engine.submit_move("g1", b, 6).await.expect("Submit failed");
    let outcome = fixture
        .engine
        .try_resolve_round("g1", &[a, b])
        .await
        .expect("Resolve failed");

    assert!(outcome.is_resolved());
    let board = board_of(&fixture);
    assert_eq!(board.get(2), Some(Cell::Occupied(a)));
    assert_eq!(board.get(6), Some(Cell::Occupied(b)));
    assert_eq!(board.occupied(), 2);
}

#[tokio::test]
async fn test_resolution_resets_pending_moves() {
    let fixture = setup_game(2);
    start(&fixture).await;
    let (a, b) = (fixture.players[0], fixture.players[1]);

    fixture.engine.submit_move("g1", a, 1).await.expect("Submit failed");
    fixture.engine.submit_move("g1", b, 2).await.expect("Submit failed");
    fixture
        .engine
        .try_resolve_round("g1", &[a, b])
        .await
        .expect("Resolve failed");

    for id in [a, b] {
        let player = fixture.store.get_player(id).expect("Get player failed");
        assert_eq!(player.pending_move, None);
    }
    // The next round waits for fresh moves.
    assert_eq!(
        fixture
            .engine
            .try_resolve_round("g1", &[a, b])
            .await
            .expect("Resolve failed"),
        RoundOutcome::Waiting
    );
}

#[tokio::test]
async fn test_resubmit_overwrites() {
    let fixture = setup_game(1);
    start(&fixture).await;
    let a = fixture.players[0];

    fixture.engine.submit_move("g1", a, 3).await.expect("Submit failed");
    fixture.engine.submit_move("g1", a, 5).await.expect("Submit failed");
    fixture
        .engine
        .try_resolve_round("g1", &[a])
        .await
        .expect("Resolve failed");

    let board = board_of(&fixture);
    assert_eq!(board.get(3), Some(Cell::Empty));
    assert_eq!(board.get(5), Some(Cell::Occupied(a)));
    assert_eq!(board.occupied(), 1);
}

#[tokio::test]
async fn test_occupied_cells_are_kept() {
    let fixture = setup_game(2);
    start(&fixture).await;
    let (a, b) = (fixture.players[0], fixture.players[1]);

    fixture.engine.submit_move("g1", a, 0).await.expect("Submit failed");
    fixture
        .engine
        .try_resolve_round("g1", &[a])
        .await
        .expect("Resolve failed");

    fixture.engine.submit_move("g1", a, 1).await.expect("Submit failed");
    fixture.engine.submit_move("g1", b, 0).await.expect("Submit failed");
    fixture
        .engine
        .try_resolve_round("g1", &[a, b])
        .await
        .expect("Resolve failed");

    let board = board_of(&fixture);
    assert_eq!(board.get(0), Some(Cell::Occupied(a)));
    assert_eq!(board.get(1), Some(Cell::Occupied(a)));
}

#[tokio::test]
async fn test_disconnected_members_do_not_block() {
    let fixture = setup_game(2);
    start(&fixture).await;
    let a = fixture.players[0];

    fixture.engine.submit_move("g1", a, 8).await.expect("Submit failed");
    let outcome = fixture
        .engine
        .try_resolve_round("g1", &[a])
        .await
        .expect("Resolve failed");
    assert!(outcome.is_resolved());
    assert_eq!(board_of(&fixture).get(8), Some(Cell::Occupied(a)));
}

#[tokio::test]
async fn test_no_connected_participants_waits() {
    let fixture = setup_game(1);
    start(&fixture).await;
    let outcome = fixture
        .engine
        .try_resolve_round("g1", &[fixture.host])
        .await
        .expect("Resolve failed");
    assert_eq!(outcome, RoundOutcome::Waiting);
}

#[tokio::test]
async fn test_host_cannot_move() {
    let fixture = setup_game(1);
    start(&fixture).await;
    assert!(matches!(
        fixture.engine.submit_move("g1", fixture.host, 0).await,
        Err(TurnError::NotAParticipant { .. })
    ));
}

#[tokio::test]
async fn test_off_board_move_rejected() {
    let fixture = setup_game(1);
    start(&fixture).await;
    let err = fixture
        .engine
        .submit_move("g1", fixture.players[0], 9)
        .await
        .expect_err("Cell 9 is off a 3x3 board");
    assert!(matches!(
        err,
        TurnError::Board(BoardError::OutOfRange { index: 9, size: 9 })
    ));
}

#[tokio::test]
async fn test_restart_clears_pending_moves() {
    let fixture = setup_game(1);
    start(&fixture).await;
    let a = fixture.players[0];
    fixture.engine.submit_move("g1", a, 4).await.expect("Submit failed");

    start(&fixture).await;
    let player = fixture.store.get_player(a).expect("Get player failed");
    assert_eq!(player.pending_move, None);
}

#[tokio::test]
async fn test_reset_pending_clears_move() {
    let fixture = setup_game(1);
    start(&fixture).await;
    let a = fixture.players[0];
    fixture.engine.submit_move("g1", a, 4).await.expect("Submit failed");

    fixture
        .engine
        .reset_pending("g1", a)
        .await
        .expect("Reset failed");
    let player = fixture.store.get_player(a).expect("Get player failed");
    assert_eq!(player.pending_move, None);
}

#[tokio::test]
async fn test_missing_game_is_terminal() {
    let fixture = setup_game(0);
    let err = fixture
        .engine
        .change_state("nope", GameState::InProgress)
        .await
        .expect_err("Unknown game");
    assert!(err.is_terminal());
}
