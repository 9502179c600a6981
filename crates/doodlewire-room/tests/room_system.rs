//! Integration tests for rooms: membership, fan-out, rounds and timers.
//!
//! Timer tests run on a paused clock, so the 60 s round and the 5 s grace
//! delay elapse instantly.

use std::time::Duration;

use doodlewire_protocol::{ConnectionId, EndReason, RoomId, ServerMessage};
use doodlewire_room::{PhaseKind, Relay, RoomConfig, RoomError, RoomStore};
use serde_json::json;
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

struct Client {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

async fn connect(store: &RoomStore, room: &RoomId, id: u64, name: &str) -> Client {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = ConnectionId::new(id);
    store.bind(id, room, name, tx).await.expect("bind");
    Client { id, rx }
}

fn kinds(msgs: &[ServerMessage]) -> Vec<&'static str> {
    msgs.iter().map(ServerMessage::kind).collect()
}

/// Waits until the room has processed everything queued before this call.
async fn settle(store: &RoomStore, room: &RoomId) {
    store.room_info(room).await.expect("room alive");
}

fn store_with_rounds(max_rounds: u32) -> RoomStore {
    RoomStore::new(RoomConfig {
        max_rounds,
        ..RoomConfig::default()
    })
}

fn word_of(msgs: &[ServerMessage]) -> String {
    msgs.iter()
        .find_map(|m| match m {
            ServerMessage::RoundStarted { word, .. } => Some(word.clone()),
            _ => None,
        })
        .expect("round_started")
}

fn round_end(msg: &ServerMessage) -> (EndReason, u32, u32, bool) {
    match msg {
        ServerMessage::RoundEnded {
            reason,
            rounds_played,
            max_rounds,
            game_over,
            ..
        } => (*reason, *rounds_played, *max_rounds, *game_over),
        other => panic!("expected round_ended, got {other:?}"),
    }
}

// =========================================================================
// Creation and membership
// =========================================================================

#[tokio::test]
async fn test_create_room_returns_id_and_creator() {
    let store = RoomStore::default();
    let (room, players) = store.create_room("Alice").await.unwrap();

    assert_eq!(room.as_str().len(), 6);
    assert_eq!(players, vec!["Alice".to_string()]);
    assert!(store.contains(&room));
    assert_eq!(store.room_count(), 1);
}

#[tokio::test]
async fn test_create_room_empty_name_rejected() {
    let store = RoomStore::default();
    let result = store.create_room("   ").await;
    assert!(matches!(result, Err(RoomError::EmptyPlayerName)));
    assert_eq!(store.room_count(), 0);
}

#[tokio::test]
async fn test_join_room_adds_member() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();

    let players = store.join_room(&room, "Bob").await.unwrap();
    assert_eq!(players, vec!["Alice".to_string(), "Bob".to_string()]);
    assert_eq!(store.players(&room).await.unwrap(), players);
}

#[tokio::test]
async fn test_join_room_duplicate_name_rejected() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();

    let result = store.join_room(&room, "Alice").await;
    assert!(matches!(
        result,
        Err(RoomError::DuplicatePlayerName { ref player_name, .. }) if player_name == "Alice"
    ));
    assert_eq!(store.players(&room).await.unwrap(), vec!["Alice".to_string()]);
}

#[tokio::test]
async fn test_join_room_unknown_room_not_found() {
    let store = RoomStore::default();
    let result = store.join_room(&RoomId::from("NOPE00"), "Bob").await;
    assert!(matches!(result, Err(RoomError::NotFound(_))));
}

#[tokio::test]
async fn test_bind_unknown_room_not_found() {
    let store = RoomStore::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = store
        .bind(ConnectionId::new(1), &RoomId::from("NOPE00"), "Alice", tx)
        .await;
    assert!(matches!(result, Err(RoomError::NotFound(_))));
    assert_eq!(store.room_of(ConnectionId::new(1)), None);
}

#[tokio::test]
async fn test_bind_broadcasts_player_joined_to_everyone() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    let mut bob = connect(&store, &room, 2, "Bob").await;

    let expected = ServerMessage::PlayerJoined {
        player_name: "Bob".into(),
        players: vec!["Alice".into(), "Bob".into()],
    };
    let alice_msgs = alice.drain();
    assert_eq!(alice_msgs.len(), 2);
    assert_eq!(alice_msgs[1], expected);
    assert_eq!(bob.drain(), vec![expected]);
    assert_eq!(store.room_of(bob.id), Some(room));
}

#[tokio::test]
async fn test_players_have_no_duplicates_across_connections() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let alice_tab1 = connect(&store, &room, 1, "Alice").await;
    let alice_tab2 = connect(&store, &room, 2, "Alice").await;
    let mut bob = connect(&store, &room, 3, "Bob").await;

    assert_eq!(
        store.players(&room).await.unwrap(),
        vec!["Alice".to_string(), "Bob".to_string()]
    );
    bob.drain();

    // Alice still has a second tab open: no player_left yet.
    store.unbind(alice_tab1.id).await;
    settle(&store, &room).await;
    assert!(bob.drain().is_empty());
    assert_eq!(store.players(&room).await.unwrap().len(), 2);

    store.unbind(alice_tab2.id).await;
    settle(&store, &room).await;
    assert_eq!(
        bob.drain(),
        vec![ServerMessage::PlayerLeft {
            player_name: "Alice".into(),
            players: vec!["Bob".into()],
        }]
    );
    assert_eq!(store.players(&room).await.unwrap(), vec!["Bob".to_string()]);
}

#[tokio::test]
async fn test_rebind_moves_connection_between_rooms() {
    let store = RoomStore::default();
    let (room_a, _) = store.create_room("Alice").await.unwrap();
    let (room_b, _) = store.create_room("Carol").await.unwrap();
    let alice = connect(&store, &room_a, 1, "Alice").await;
    let mut bob = connect(&store, &room_a, 2, "Bob").await;
    bob.drain();

    let (tx, _rx) = mpsc::unbounded_channel();
    let players = store.bind(alice.id, &room_b, "Alice", tx).await.unwrap();

    assert_eq!(players, vec!["Carol".to_string(), "Alice".to_string()]);
    assert_eq!(store.room_of(alice.id), Some(room_b));
    assert_eq!(store.players(&room_a).await.unwrap(), vec!["Bob".to_string()]);
    assert_eq!(kinds(&bob.drain()), vec!["player_left"]);
}

#[tokio::test]
async fn test_list_rooms_reports_every_room() {
    let store = RoomStore::default();
    let (a, _) = store.create_room("Alice").await.unwrap();
    let (b, _) = store.create_room("Bob").await.unwrap();

    let rooms = store.list_rooms().await;
    let mut ids: Vec<RoomId> = rooms.iter().map(|r| r.room_id.clone()).collect();
    let mut expected = vec![a, b];
    ids.sort();
    expected.sort();
    assert_eq!(ids, expected);
    assert!(rooms.iter().all(|r| r.phase == PhaseKind::Idle && r.max_rounds == 5));
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_draw_relay_excludes_only_origin_connection() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice_tab1 = connect(&store, &room, 1, "Alice").await;
    let mut alice_tab2 = connect(&store, &room, 2, "Alice").await;
    let mut bob = connect(&store, &room, 3, "Bob").await;
    alice_tab1.drain();
    alice_tab2.drain();
    bob.drain();

    let stroke = json!({"x": 1, "y": 2});
    store
        .relay(&room, alice_tab1.id, Relay::Draw(stroke.clone()))
        .await
        .unwrap();
    settle(&store, &room).await;

    let expected = ServerMessage::DrawAction {
        player_name: "Alice".into(),
        action: stroke,
    };
    assert!(alice_tab1.drain().is_empty());
    assert_eq!(alice_tab2.drain(), vec![expected.clone()]);
    assert_eq!(bob.drain(), vec![expected]);
}

#[tokio::test]
async fn test_chat_relay_reaches_everyone_including_sender() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    let mut bob = connect(&store, &room, 2, "Bob").await;
    alice.drain();
    bob.drain();

    store
        .relay(&room, bob.id, Relay::Chat(json!("hello")))
        .await
        .unwrap();
    settle(&store, &room).await;

    let expected = ServerMessage::ChatMessage {
        player_name: "Bob".into(),
        message: json!("hello"),
    };
    assert_eq!(alice.drain(), vec![expected.clone()]);
    assert_eq!(bob.drain(), vec![expected]);
}

#[tokio::test]
async fn test_relay_from_unbound_connection_dropped() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    alice.drain();

    store
        .relay(&room, ConnectionId::new(99), Relay::Chat(json!("spoof")))
        .await
        .unwrap();
    settle(&store, &room).await;
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn test_dead_connection_pruned_and_announced() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let alice = connect(&store, &room, 1, "Alice").await;
    let mut bob = connect(&store, &room, 2, "Bob").await;
    bob.drain();
    drop(alice.rx);

    store
        .relay(&room, bob.id, Relay::Chat(json!("anyone?")))
        .await
        .unwrap();
    settle(&store, &room).await;

    assert_eq!(kinds(&bob.drain()), vec!["chat_message", "player_left"]);
    let info = store.room_info(&room).await.unwrap();
    assert_eq!(info.players, vec!["Bob".to_string()]);
    assert_eq!(info.connections, 1);
}

// =========================================================================
// Rounds
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_single_player_round_times_out_then_next_starts() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    alice.drain();

    store.start_round(&room).await.unwrap();
    settle(&store, &room).await;
    match alice.drain().as_slice() {
        [ServerMessage::RoundStarted { drawer, .. }] => assert_eq!(drawer, "Alice"),
        other => panic!("unexpected {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(61)).await;
    let msgs = alice.drain();
    assert_eq!(msgs.len(), 1);
    assert_eq!(round_end(&msgs[0]), (EndReason::TimeOut, 1, 5, false));
    assert_eq!(store.room_info(&room).await.unwrap().phase, PhaseKind::Grace);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(kinds(&alice.drain()), vec!["round_started"]);
    let info = store.room_info(&room).await.unwrap();
    assert_eq!(info.phase, PhaseKind::Active);
    assert_eq!(info.drawer.as_deref(), Some("Alice"));
    assert_eq!(info.rounds_played, 1);
}

#[tokio::test(start_paused = true)]
async fn test_max_rounds_one_time_out_ends_game() {
    let store = store_with_rounds(1);
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    alice.drain();

    store.start_round(&room).await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;

    let msgs = alice.drain();
    assert_eq!(kinds(&msgs), vec!["round_started", "round_ended"]);
    assert_eq!(round_end(&msgs[1]), (EndReason::TimeOut, 1, 1, true));

    // No automatic restart.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(alice.drain().is_empty());
    let info = store.room_info(&room).await.unwrap();
    assert_eq!(info.phase, PhaseKind::GameOver);
    assert_eq!(info.pending_timer, None);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_time_outs_reach_game_over() {
    let store = store_with_rounds(3);
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    alice.drain();

    store.start_round(&room).await.unwrap();
    // Three rounds of 60 s with two 5 s gaps.
    tokio::time::sleep(Duration::from_secs(60 * 3 + 5 * 2 + 1)).await;

    let ends: Vec<_> = alice
        .drain()
        .iter()
        .filter(|m| m.kind() == "round_ended")
        .map(round_end)
        .collect();
    assert_eq!(
        ends,
        vec![
            (EndReason::TimeOut, 1, 3, false),
            (EndReason::TimeOut, 2, 3, false),
            (EndReason::TimeOut, 3, 3, true),
        ]
    );
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(alice.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_round_while_active_leaves_state_and_timer() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    let _bob = connect(&store, &room, 2, "Bob").await;
    alice.drain();

    store.start_round(&room).await.unwrap();
    let before = store.room_info(&room).await.unwrap();
    assert_eq!(before.phase, PhaseKind::Active);
    assert!(before.pending_timer.is_some());

    tokio::time::sleep(Duration::from_secs(10)).await;
    store.start_round(&room).await.unwrap();
    let after = store.room_info(&room).await.unwrap();

    assert_eq!(after, before);
    assert_eq!(kinds(&alice.drain()), vec!["round_started"]);

    // Still expires on the original schedule.
    tokio::time::sleep(Duration::from_secs(51)).await;
    assert_eq!(kinds(&alice.drain()), vec!["round_ended"]);
}

#[tokio::test(start_paused = true)]
async fn test_start_round_during_grace_is_noop() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;

    store.start_round(&room).await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;
    alice.drain();
    let before = store.room_info(&room).await.unwrap();
    assert_eq!(before.phase, PhaseKind::Grace);

    store.start_round(&room).await.unwrap();
    let after = store.room_info(&room).await.unwrap();
    assert_eq!(after, before);
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn test_start_round_after_member_left_picks_remaining_player() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let alice = connect(&store, &room, 1, "Alice").await;
    let mut bob = connect(&store, &room, 2, "Bob").await;
    store.unbind(alice.id).await;
    bob.drain();

    // Bob is the only member left, so the round starts with him drawing.
    store.start_round(&room).await.unwrap();
    settle(&store, &room).await;
    match bob.drain().as_slice() {
        [ServerMessage::RoundStarted { drawer, .. }] => assert_eq!(drawer, "Bob"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_matching_guess_ends_round_and_cancels_expiry() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    alice.drain();

    store.start_round(&room).await.unwrap();
    let expiry = store.room_info(&room).await.unwrap().pending_timer;
    let word = word_of(&alice.drain());

    store.submit_guess(&room, format!("{word}!")).await.unwrap();
    let info = store.room_info(&room).await.unwrap();
    assert_eq!(info.phase, PhaseKind::Grace);
    assert_ne!(info.pending_timer, expiry);

    let msgs = alice.drain();
    assert!(matches!(
        &msgs[0],
        ServerMessage::AiGuess { guess, .. } if *guess == format!("{word}!")
    ));
    assert_eq!(round_end(&msgs[1]), (EndReason::Matched, 1, 5, false));

    // The cancelled expiry would have fired at 60 s; only the next round
    // starts (at 5 s), and its own expiry is not due until 65 s.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(kinds(&alice.drain()), vec!["round_started"]);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_guess_is_broadcast_only() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;

    store.start_round(&room).await.unwrap();
    settle(&store, &room).await;
    alice.drain();

    store.submit_guess(&room, "无法识别图像".into()).await.unwrap();
    settle(&store, &room).await;
    assert_eq!(kinds(&alice.drain()), vec!["ai_guess"]);
    assert_eq!(store.room_info(&room).await.unwrap().phase, PhaseKind::Active);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_game_over_allows_new_game() {
    let store = store_with_rounds(1);
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;

    store.start_round(&room).await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;
    alice.drain();

    store.restart(&room).await.unwrap();
    settle(&store, &room).await;
    match alice.drain().as_slice() {
        [ServerMessage::GameReset {
            rounds_played,
            max_rounds,
            ..
        }] => {
            assert_eq!(*rounds_played, 0);
            assert_eq!(*max_rounds, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    store.start_round(&room).await.unwrap();
    let info = store.room_info(&room).await.unwrap();
    assert_eq!(info.phase, PhaseKind::Active);
    assert_eq!(info.rounds_played, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_outside_game_over_ignored() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    store.start_round(&room).await.unwrap();
    settle(&store, &room).await;
    alice.drain();

    store.restart(&room).await.unwrap();
    settle(&store, &room).await;
    assert!(alice.drain().is_empty());
    assert_eq!(store.room_info(&room).await.unwrap().phase, PhaseKind::Active);
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_last_connection_leaving_destroys_room() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let mut alice = connect(&store, &room, 1, "Alice").await;
    store.start_round(&room).await.unwrap();
    settle(&store, &room).await;
    alice.drain();

    assert!(store.unbind(alice.id).await, "room should shut down");
    assert!(!store.contains(&room));
    assert_eq!(store.room_count(), 0);
    assert_eq!(store.room_of(alice.id), None);

    // The pending expiry never fires.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(alice.drain().is_empty());
    assert!(matches!(
        store.room_info(&room).await,
        Err(RoomError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unbind_with_others_left_keeps_room() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let alice = connect(&store, &room, 1, "Alice").await;
    let _bob = connect(&store, &room, 2, "Bob").await;

    assert!(!store.unbind(alice.id).await);
    assert!(store.contains(&room));
    assert!(!store.unbind(alice.id).await, "second unbind is a no-op");
}

#[tokio::test(start_paused = true)]
async fn test_pruning_last_connection_destroys_room() {
    let store = RoomStore::default();
    let (room, _) = store.create_room("Alice").await.unwrap();
    let alice = connect(&store, &room, 1, "Alice").await;
    drop(alice.rx);

    store.start_round(&room).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!store.contains(&room));
    // The connection's own cleanup still finds nothing to do.
    assert!(!store.unbind(alice.id).await);
}
