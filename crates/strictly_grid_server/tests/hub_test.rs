//! End-to-end tests of the dispatch loop with simulated connections.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::time::Duration;
use strictly_grid::Symbol;
use strictly_grid_server::{
    ConnectionId, GameHub, GameSnapshot, HubHandle, Outbound, PlayerKind, ServerConfig,
    ServerMessage, Winner,
};
use tokio::sync::mpsc;

struct Client {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Client {
    fn connect(hub: &HubHandle) -> Self {
        let id = hub.next_connection_id();
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(hub.connected(id, tx));
        Self { id, rx }
    }

    fn send(&self, hub: &HubHandle, message: serde_json::Value) {
        assert!(hub.inbound(self.id, message.to_string()));
    }

    async fn recv(&mut self) -> ServerMessage {
        match self.rx.recv().await {
            Some(Outbound::Message(message)) => message,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    async fn recv_update(&mut self) -> GameSnapshot {
        match self.recv().await {
            ServerMessage::Update { game_state } => game_state,
            other => panic!("expected update, got {:?}", other),
        }
    }

    async fn recv_identity(&mut self) -> (Symbol, String) {
        match self.recv().await {
            ServerMessage::AssignIdentity { symbol, player_id } => (symbol, player_id),
            other => panic!("expected assignIdentity, got {:?}", other),
        }
    }

    /// Asserts nothing is queued once the hub has drained its inbox.
    async fn assert_silent(&mut self, hub: &HubHandle) {
        let _ = hub.snapshot().await;
        assert!(self.rx.try_recv().is_err(), "unexpected frame queued");
    }
}

fn spawn_hub(config: ServerConfig) -> HubHandle {
    let (hub, handle) = GameHub::with_rng(config, StdRng::seed_from_u64(11));
    tokio::spawn(hub.run());
    handle
}

fn join(name: &str, size: usize) -> serde_json::Value {
    json!({"type": "join", "payload": {"name": name, "size": size}})
}

fn play(index: usize) -> serde_json::Value {
    json!({"type": "move", "payload": {"index": index}})
}

struct Pair {
    x: Client,
    o: Client,
    o_token: String,
}

async fn start_pair(hub: &HubHandle, size: usize) -> Pair {
    let mut x = Client::connect(hub);
    x.send(hub, join("Ana", size));
    assert_eq!(x.recv_identity().await.0, Symbol::First);
    let waiting = x.recv_update().await;
    assert!(!waiting.game_active);

    let mut o = Client::connect(hub);
    o.send(hub, join("Ben", size));
    let (symbol, o_token) = o.recv_identity().await;
    assert_eq!(symbol, Symbol::Second);
    assert!(o.recv_update().await.game_active);
    assert!(x.recv_update().await.game_active);

    Pair { x, o, o_token }
}

/// Plays alternating moves starting with X, draining the broadcast after
/// each and returning the last message.
async fn play_sequence(hub: &HubHandle, pair: &mut Pair, moves: &[usize]) -> ServerMessage {
    let mut last = None;
    for (turn, index) in moves.iter().enumerate() {
        let mover = if turn % 2 == 0 { &pair.x } else { &pair.o };
        mover.send(hub, play(*index));
        let seen_by_x = pair.x.recv().await;
        let seen_by_o = pair.o.recv().await;
        assert_eq!(seen_by_x, seen_by_o);
        last = Some(seen_by_x);
    }
    last.expect("at least one move")
}

#[tokio::test(start_paused = true)]
async fn test_two_player_match_to_a_win() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;

    // X: 0, 1, 7  O: 4, 2 leaves the round open.
    let after_seven = play_sequence(&hub, &mut pair, &[0, 4, 1, 2, 7]).await;
    let ServerMessage::Update { game_state } = after_seven else {
        panic!("expected the round to continue, got {:?}", after_seven);
    };
    assert!(game_state.game_active);
    assert_eq!(game_state.current_player, Symbol::Second);
    assert_eq!(game_state.last_move_index, Some(7));

    pair.o.send(&hub, play(6));
    match pair.x.recv().await {
        ServerMessage::GameOver {
            winner_symbol,
            game_state,
            winning_line,
            winning_line_id,
        } => {
            assert_eq!(winner_symbol, Winner::Symbol(Symbol::Second));
            assert_eq!(winning_line, Some(vec![2, 4, 6]));
            assert_eq!(winning_line_id.as_deref(), Some("anti-2"));
            assert_eq!(game_state.scores.second, 1);
            assert_eq!(game_state.scores.first, 0);
            assert!(!game_state.game_active);
        }
        other => panic!("expected gameOver, got {:?}", other),
    }
    assert!(matches!(pair.o.recv().await, ServerMessage::GameOver { .. }));

    // The board is frozen after the round ends.
    pair.x.send(&hub, play(8));
    pair.x.assert_silent(&hub).await;
}

#[tokio::test(start_paused = true)]
async fn test_full_board_without_run_is_a_draw() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;

    let last = play_sequence(&hub, &mut pair, &[0, 1, 2, 4, 3, 5, 7, 6, 8]).await;
    match last {
        ServerMessage::GameOver {
            winner_symbol,
            game_state,
            winning_line,
            ..
        } => {
            assert_eq!(winner_symbol, Winner::Draw);
            assert_eq!(winning_line, None);
            assert_eq!(game_state.scores.first + game_state.scores.second, 0);
        }
        other => panic!("expected gameOver, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_illegal_moves_are_silent() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;
    let before = hub.snapshot().await;

    // Out of turn.
    pair.o.send(&hub, play(0));
    // Occupied, after a legal move.
    pair.x.send(&hub, play(4));
    pair.x.recv_update().await;
    pair.o.recv_update().await;
    pair.o.send(&hub, play(4));
    // Out of range.
    pair.o.send(&hub, play(9));

    pair.x.assert_silent(&hub).await;
    pair.o.assert_silent(&hub).await;
    let after = hub.snapshot().await.unwrap();
    assert_eq!(after.last_move_index, Some(4));
    assert_eq!(after.current_player, Symbol::Second);
    assert_ne!(before, Some(after));
}

#[tokio::test(start_paused = true)]
async fn test_third_join_is_rejected_and_closed() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;

    let mut late = Client::connect(&hub);
    late.send(&hub, join("Cy", 3));
    match late.recv().await {
        ServerMessage::Error { message } => assert!(message.contains("full")),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(late.rx.recv().await, Some(Outbound::Close));

    pair.x.assert_silent(&hub).await;
    pair.o.assert_silent(&hub).await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_keeps_scores_and_names() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;
    play_sequence(&hub, &mut pair, &[0, 3, 1, 4, 2]).await;

    pair.o.send(&hub, json!({"type": "reset", "payload": {}}));
    let x_view = pair.x.recv_update().await;
    let o_view = pair.o.recv_update().await;
    assert_eq!(x_view, o_view);

    assert!(x_view.game_active);
    assert!(x_view.board.iter().all(Option::is_none));
    assert_eq!(x_view.current_player, Symbol::First);
    assert_eq!(x_view.last_move_index, None);
    assert_eq!(x_view.scores.first, 1);
    assert_eq!(x_view.players_info.get(Symbol::First).map(|p| p.name.as_str()), Some("Ana"));
    assert_eq!(x_view.players_info.get(Symbol::Second).map(|p| p.name.as_str()), Some("Ben"));
}

#[tokio::test(start_paused = true)]
async fn test_reset_waits_for_second_player() {
    let hub = spawn_hub(ServerConfig::default());
    let mut solo = Client::connect(&hub);
    solo.send(&hub, join("Ana", 4));
    solo.recv_identity().await;
    solo.recv_update().await;

    solo.send(&hub, json!({"type": "reset"}));
    solo.assert_silent(&hub).await;
    assert!(!hub.snapshot().await.unwrap().game_active);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_restores_slot() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;
    play_sequence(&hub, &mut pair, &[4]).await;
    let before = hub.snapshot().await.unwrap();

    hub.disconnected(pair.o.id);
    match pair.x.recv().await {
        ServerMessage::OpponentDisconnected {
            grace_seconds,
            game_state,
            ..
        } => {
            assert_eq!(grace_seconds, 15);
            assert!(!game_state.players_info.get(Symbol::Second).unwrap().connected);
        }
        other => panic!("expected opponentDisconnected, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut back = Client::connect(&hub);
    back.send(&hub, json!({"type": "reconnect", "payload": {"playerId": pair.o_token}}));
    assert_eq!(back.recv_identity().await, (Symbol::Second, pair.o_token.clone()));
    let resumed = back.recv_update().await;
    assert_eq!(pair.x.recv_update().await, resumed);
    assert_eq!(resumed, before);

    // The cancelled timer must not end the match later.
    tokio::time::sleep(Duration::from_secs(30)).await;
    pair.x.assert_silent(&hub).await;
    back.send(&hub, play(0));
    assert_eq!(back.recv_update().await.last_move_index, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_with_unknown_token() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;
    let before = hub.snapshot().await;

    let mut stranger = Client::connect(&hub);
    stranger.send(&hub, json!({"type": "reconnect", "payload": {"playerId": "forged"}}));
    match stranger.recv().await {
        ServerMessage::Error { message } => assert!(message.contains("identity")),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(hub.snapshot().await, before);
    pair.x.assert_silent(&hub).await;
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_ends_the_match() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;

    hub.disconnected(pair.o.id);
    assert!(matches!(
        pair.x.recv().await,
        ServerMessage::OpponentDisconnected { .. }
    ));

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(matches!(pair.x.recv().await, ServerMessage::GameEnded { .. }));
    assert_eq!(hub.snapshot().await, None);

    // The stale token is gone with the session.
    let mut back = Client::connect(&hub);
    back.send(&hub, json!({"type": "reconnect", "payload": {"playerId": pair.o_token}}));
    assert!(matches!(back.recv().await, ServerMessage::Error { .. }));

    // The survivor can start over.
    pair.x.send(&hub, join("Ana", 5));
    assert_eq!(pair.x.recv_identity().await.0, Symbol::First);
    assert_eq!(pair.x.recv_update().await.win_condition, 5);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_policy_ends_match_on_disconnect() {
    let config = ServerConfig::from_toml_str("disconnect_policy = \"immediate\"").unwrap();
    let hub = spawn_hub(config);
    let mut pair = start_pair(&hub, 3).await;

    hub.disconnected(pair.x.id);
    assert!(matches!(pair.o.recv().await, ServerMessage::OpponentLeft { .. }));
    assert_eq!(hub.snapshot().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_ai_answers_after_thinking_delay() {
    let hub = spawn_hub(ServerConfig::default());
    let mut human = Client::connect(&hub);
    human.send(&hub, json!({"type": "startGameAI", "payload": {"name": "Solo", "size": 3}}));
    assert_eq!(human.recv_identity().await.0, Symbol::First);
    let opening = human.recv_update().await;
    assert!(opening.is_ai_game);
    assert!(opening.game_active);
    let ai = opening.players_info.get(Symbol::Second).unwrap();
    assert_eq!(ai.kind, PlayerKind::Ai);
    assert_eq!(ai.name, "Computer");

    human.send(&hub, play(0));
    assert_eq!(human.recv_update().await.current_player, Symbol::Second);

    let started = tokio::time::Instant::now();
    let answer = human.recv_update().await;
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(answer.last_move_index, Some(4));
    assert_eq!(answer.board[4], Some(Symbol::Second));
    assert_eq!(answer.current_player, Symbol::First);
}

#[tokio::test(start_paused = true)]
async fn test_reset_discards_pending_ai_move() {
    let hub = spawn_hub(ServerConfig::default());
    let mut human = Client::connect(&hub);
    human.send(&hub, json!({"type": "startGameAI", "payload": {"name": "Solo", "size": 3}}));
    human.recv_identity().await;
    human.recv_update().await;

    human.send(&hub, play(0));
    human.recv_update().await;
    human.send(&hub, json!({"type": "reset"}));
    let fresh = human.recv_update().await;
    assert!(fresh.board.iter().all(Option::is_none));

    tokio::time::sleep(Duration::from_secs(2)).await;
    human.assert_silent(&hub).await;
    let state = hub.snapshot().await.unwrap();
    assert!(state.board.iter().all(Option::is_none));
    assert_eq!(state.current_player, Symbol::First);
}

#[tokio::test(start_paused = true)]
async fn test_ai_game_size_is_restricted() {
    let hub = spawn_hub(ServerConfig::default());
    let mut human = Client::connect(&hub);
    human.send(&hub, json!({"type": "startGameAI", "payload": {"name": "Solo", "size": 4}}));
    assert!(matches!(human.recv().await, ServerMessage::Error { .. }));
    assert_eq!(hub.snapshot().await, None);

    let config = ServerConfig::from_toml_str("ai_any_size = true").unwrap();
    let hub = spawn_hub(config);
    let mut human = Client::connect(&hub);
    human.send(&hub, json!({"type": "startGameAI", "payload": {"name": "Solo", "size": 4}}));
    human.recv_identity().await;
    assert_eq!(human.recv_update().await.size, 4);

    human.send(&hub, play(0));
    human.recv_update().await;
    let answer = human.recv_update().await;
    let index = answer.last_move_index.unwrap();
    assert_ne!(index, 0);
    assert_eq!(answer.board[index], Some(Symbol::Second));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_get_no_reply() {
    let hub = spawn_hub(ServerConfig::default());
    let mut client = Client::connect(&hub);

    assert!(hub.inbound(client.id, "not json"));
    client.send(&hub, json!({"type": "teleport", "payload": {}}));
    client.send(&hub, json!({"type": "move", "payload": {"index": "four"}}));
    client.assert_silent(&hub).await;

    client.send(&hub, join("Ana", 3));
    assert_eq!(client.recv_identity().await.0, Symbol::First);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_board_size_is_reported() {
    let hub = spawn_hub(ServerConfig::default());
    let mut client = Client::connect(&hub);
    client.send(&hub, join("Ana", 40));
    match client.recv().await {
        ServerMessage::Error { message } => assert!(message.contains("40")),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(hub.snapshot().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_join_from_bound_connection_is_ignored() {
    let hub = spawn_hub(ServerConfig::default());
    let mut client = Client::connect(&hub);
    client.send(&hub, join("Ana", 3));
    client.recv_identity().await;
    client.recv_update().await;

    client.send(&hub, join("Ana again", 3));
    client.assert_silent(&hub).await;
    let state = hub.snapshot().await.unwrap();
    assert!(state.players_info.get(Symbol::Second).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_seated_connection_cannot_reconnect_into_other_slot() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;
    let before = hub.snapshot().await;

    let token = pair.o_token.clone();
    pair.x
        .send(&hub, json!({"type": "reconnect", "payload": {"playerId": token}}));
    pair.x.assert_silent(&hub).await;
    pair.o.assert_silent(&hub).await;
    assert_eq!(hub.snapshot().await, before);

    // Each side still moves for itself and sees every update once.
    pair.x.send(&hub, play(0));
    assert_eq!(pair.x.recv_update().await.current_player, Symbol::Second);
    assert_eq!(pair.o.recv_update().await.current_player, Symbol::Second);
    pair.o.send(&hub, play(4));
    assert_eq!(pair.x.recv_update().await.last_move_index, Some(4));
    assert_eq!(pair.o.recv_update().await.last_move_index, Some(4));
    pair.x.assert_silent(&hub).await;
    pair.o.assert_silent(&hub).await;
}

#[tokio::test(start_paused = true)]
async fn test_seated_player_starting_ai_game_is_ignored() {
    let hub = spawn_hub(ServerConfig::default());
    let mut pair = start_pair(&hub, 3).await;

    pair.x.send(
        &hub,
        json!({"type": "startGameAI", "payload": {"name": "Ana", "size": 3}}),
    );
    pair.x.assert_silent(&hub).await;
    pair.o.assert_silent(&hub).await;

    let state = hub.snapshot().await.unwrap();
    assert!(!state.is_ai_game);
    assert!(state.players_info.get(Symbol::First).unwrap().connected);

    pair.x.send(&hub, play(0));
    assert_eq!(pair.x.recv_update().await.last_move_index, Some(0));
    assert_eq!(pair.o.recv_update().await.last_move_index, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_ai_move_for_destroyed_session_is_discarded() {
    let config = ServerConfig::from_toml_str("disconnect_policy = \"immediate\"").unwrap();
    let hub = spawn_hub(config);

    let mut first = Client::connect(&hub);
    first.send(&hub, json!({"type": "startGameAI", "payload": {"name": "Solo", "size": 3}}));
    first.recv_identity().await;
    first.recv_update().await;
    first.send(&hub, play(0));
    first.recv_update().await;

    // The session goes away while its AI reply is still pending.
    hub.disconnected(first.id);
    assert_eq!(hub.snapshot().await, None);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut second = Client::connect(&hub);
    second.send(&hub, json!({"type": "startGameAI", "payload": {"name": "Again", "size": 3}}));
    second.recv_identity().await;
    second.recv_update().await;
    second.send(&hub, play(8));
    second.recv_update().await;

    // The old reply fires at 600ms on the same epoch; only the new one lands.
    let started = tokio::time::Instant::now();
    let answer = second.recv_update().await;
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(answer.current_player, Symbol::First);
    assert_eq!(answer.board.iter().filter(|cell| cell.is_some()).count(), 2);
    assert_eq!(answer.board[0], None);

    tokio::time::sleep(Duration::from_secs(2)).await;
    second.assert_silent(&hub).await;
    let state = hub.snapshot().await.unwrap();
    assert_eq!(state.board.iter().filter(|cell| cell.is_some()).count(), 2);
}
