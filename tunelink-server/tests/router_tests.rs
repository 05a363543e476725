//! Integration tests for the message router and connection registry

mod helpers;

use std::time::Duration;

use helpers::{create_test_state, seed_match, seed_user};
use tokio::sync::mpsc;
use tunelink_common::events::{ClientEvent, ServerEvent};
use tunelink_server::db::messages::{count_messages, history_page};
use tunelink_server::router::Handled;
use tunelink_server::{AppState, Error};

const MATCH: i64 = 7;

async fn setup() -> (tempfile::TempDir, AppState) {
    let (dir, state) = create_test_state().await;
    for user in [42, 43, 44] {
        seed_user(&state.db, user).await;
    }
    seed_match(&state.db, MATCH, 42, 43, 55.0).await;
    (dir, state)
}

fn channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
    mpsc::channel(16)
}

async fn recv(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

#[tokio::test]
async fn test_message_reaches_every_session_of_both_participants() {
    let (_dir, state) = setup().await;
    let (tx_a1, mut rx_a1) = channel();
    let (tx_a2, mut rx_a2) = channel();
    let (tx_b, mut rx_b) = channel();
    let _a1 = state.registry.register(42, tx_a1);
    let _a2 = state.registry.register(42, tx_a2);
    let _b = state.registry.register(43, tx_b);

    let payload = state.router.send_message(42, MATCH, "hello").await.unwrap();

    for rx in [&mut rx_a1, &mut rx_a2, &mut rx_b] {
        match recv(rx).await {
            ServerEvent::Message(received) => assert_eq!(received, payload),
            other => panic!("expected message, got {:?}", other),
        }
    }

    let page = history_page(&state.db, MATCH, 20, 0).await.unwrap();
    assert_eq!(page[0].id, payload.message_id);
    assert_eq!(page[0].sender_id, 42);
    assert_eq!(page[0].body, "hello");
}

#[tokio::test]
async fn test_non_participant_is_forbidden_and_nothing_persists() {
    let (_dir, state) = setup().await;
    let (tx, mut rx) = channel();
    let _b = state.registry.register(43, tx);

    let result = state.router.send_message(44, MATCH, "let me in").await;
    assert!(matches!(result, Err(Error::Forbidden(_))));
    assert_eq!(count_messages(&state.db, MATCH).await.unwrap(), 0);
    assert!(rx.try_recv().is_err());

    let read = state.router.mark_read(44, MATCH).await;
    assert!(matches!(read, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn test_non_participant_with_invalid_text_is_still_forbidden() {
    let (_dir, state) = setup().await;

    let blank = state.router.send_message(44, MATCH, "   ").await;
    assert!(matches!(blank, Err(Error::Forbidden(_))));

    let long = "x".repeat(4001);
    let oversized = state.router.send_message(44, MATCH, &long).await;
    assert!(matches!(oversized, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn test_unknown_match_is_not_found() {
    let (_dir, state) = setup().await;
    let result = state.router.send_message(42, 999, "anyone?").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_blank_or_oversized_text_is_rejected() {
    let (_dir, state) = setup().await;

    let blank = state.router.send_message(42, MATCH, "   ").await;
    assert!(matches!(blank, Err(Error::Validation(_))));

    let long = "x".repeat(4001);
    let oversized = state.router.send_message(42, MATCH, &long).await;
    assert!(matches!(oversized, Err(Error::Validation(_))));

    assert_eq!(count_messages(&state.db, MATCH).await.unwrap(), 0);
}

#[tokio::test]
async fn test_mark_read_is_idempotent_and_notifies_only_the_peer() {
    let (_dir, state) = setup().await;
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    let _a = state.registry.register(42, tx_a);
    let _b = state.registry.register(43, tx_b);

    state.router.send_message(42, MATCH, "one").await.unwrap();
    state.router.send_message(42, MATCH, "two").await.unwrap();
    for _ in 0..2 {
        recv(&mut rx_a).await;
        recv(&mut rx_b).await;
    }

    assert_eq!(state.router.mark_read(43, MATCH).await.unwrap(), 2);
    match recv(&mut rx_a).await {
        ServerEvent::ReadReceipt(receipt) => {
            assert_eq!(receipt.match_id, MATCH);
            assert_eq!(receipt.reader_id, 43);
        }
        other => panic!("expected read receipt, got {:?}", other),
    }
    assert!(rx_b.try_recv().is_err());

    let first_read: Vec<_> = history_page(&state.db, MATCH, 20, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.read_at)
        .collect();
    assert!(first_read.iter().all(Option::is_some));

    // Second call changes nothing and sends nothing
    assert_eq!(state.router.mark_read(43, MATCH).await.unwrap(), 0);
    let second_read: Vec<_> = history_page(&state.db, MATCH, 20, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.read_at)
        .collect();
    assert_eq!(first_read, second_read);
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn test_sender_cannot_mark_own_messages_read() {
    let (_dir, state) = setup().await;
    state.router.send_message(42, MATCH, "mine").await.unwrap();

    assert_eq!(state.router.mark_read(42, MATCH).await.unwrap(), 0);
    let page = history_page(&state.db, MATCH, 20, 0).await.unwrap();
    assert!(page[0].read_at.is_none());
}

#[tokio::test]
async fn test_closing_one_session_keeps_the_other() {
    let (_dir, state) = setup().await;
    let (tx_1, _rx_1) = channel();
    let (tx_2, mut rx_2) = channel();
    let first = state.registry.register(42, tx_1);
    let _second = state.registry.register(42, tx_2);

    drop(first);
    assert_eq!(state.registry.connection_count(42), 1);

    let payload = state.router.send_message(43, MATCH, "still there?").await.unwrap();
    match recv(&mut rx_2).await {
        ServerEvent::Message(received) => assert_eq!(received.message_id, payload.message_id),
        other => panic!("expected message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sent_at_strictly_increases() {
    let (_dir, state) = setup().await;

    let mut previous = None;
    for i in 0..50 {
        let sender = if i % 2 == 0 { 42 } else { 43 };
        let payload = state
            .router
            .send_message(sender, MATCH, &format!("msg {i}"))
            .await
            .unwrap();
        if let Some(prev) = previous {
            assert!(payload.sent_at > prev);
        }
        previous = Some(payload.sent_at);
    }

    let page = history_page(&state.db, MATCH, 1, 0).await.unwrap();
    assert_eq!(page[0].body, "msg 49");
}

#[tokio::test]
async fn test_handle_dispatches_client_events() {
    let (_dir, state) = setup().await;

    let sent = state
        .router
        .handle(
            42,
            ClientEvent::Message {
                match_id: MATCH,
                message_text: "via handle".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(sent, Handled::Sent(_)));

    let read = state
        .router
        .handle(43, ClientEvent::Read { match_id: MATCH })
        .await
        .unwrap();
    assert_eq!(read, Handled::Read(1));
}
