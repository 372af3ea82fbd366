//! Tests for ConnectionManager lifecycle, backoff and outbound queue

mod common;

use centli_client::connection::{ConnectionManager, ConnectionState};
use centli_client::events::EventBus;
use centli_client::protocol::ClientMessage;
use common::{connection_config, settle, store_with_user, MockConnector};
use std::time::Duration;

fn chat(content: &str) -> ClientMessage {
    ClientMessage::Message {
        content: content.to_string(),
        user_id: Some("user-1".to_string()),
        session_id: Some("session_1".to_string()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_then_error() {
    let (connector, _accepted) = MockConnector::new();
    connector.refuse_all(true);
    let store = store_with_user();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store.clone(),
        EventBus::default(),
    );

    manager.connect();
    manager.wait_for(ConnectionState::Error).await.unwrap();

    // Initial attempt plus five retries
    assert_eq!(connector.attempts(), 6);
    let gaps: Vec<u64> = connector.gaps().iter().map(|gap| gap.as_secs()).collect();
    assert_eq!(gaps, vec![1, 2, 4, 8, 16]);

    let state = store.get();
    assert_eq!(state.connection_status, ConnectionState::Error);
    assert_eq!(state.reconnect_attempts, 5);
    assert_eq!(state.error.as_deref(), Some("Unable to connect to the server"));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 6);
    assert_eq!(manager.state(), ConnectionState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_queued_messages_flush_after_authenticate() {
    let (connector, mut accepted) = MockConnector::new();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector,
        store_with_user(),
        EventBus::default(),
    );

    manager.send(chat("first"));
    manager.send(chat("second"));
    manager.send(chat("third"));
    assert_eq!(manager.queued().await, 3);

    manager.connect();
    let mut server = accepted.recv().await.unwrap();

    let auth = server.next_frame().await;
    assert_eq!(auth["action"], "authenticate");
    assert_eq!(auth["user_id"], "user-1");
    assert_eq!(auth["session_id"], "session_1");
    assert_eq!(auth["token"], "token-1");

    for expected in ["first", "second", "third"] {
        let frame = server.next_frame().await;
        assert_eq!(frame["action"], "message");
        assert_eq!(frame["content"], expected);
    }
    assert_eq!(manager.queued().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_drops_newest() {
    let (connector, mut accepted) = MockConnector::new();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector,
        store_with_user(),
        EventBus::default(),
    );

    for i in 0..11 {
        manager.send(chat(&format!("msg {}", i)));
    }
    assert_eq!(manager.queued().await, 10);

    manager.connect();
    let mut server = accepted.recv().await.unwrap();
    assert_eq!(server.next_frame().await["action"], "authenticate");
    for i in 0..10 {
        assert_eq!(server.next_frame().await["content"], format!("msg {}", i));
    }
    assert!(server
        .try_next_frame(Duration::from_millis(100))
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_send_while_connected_goes_straight_out() {
    let (connector, mut accepted) = MockConnector::new();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector,
        store_with_user(),
        EventBus::default(),
    );

    manager.connect();
    let mut server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();
    assert_eq!(server.next_frame().await["action"], "authenticate");

    manager.send(chat("hello"));
    assert_eq!(server.next_frame().await["content"], "hello");
    assert_eq!(manager.queued().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let (connector, mut accepted) = MockConnector::new();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store_with_user(),
        EventBus::default(),
    );

    manager.connect();
    let mut server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();

    manager.disconnect().await;
    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    server.closed_by_client().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let (connector, mut accepted) = MockConnector::new();
    let store = store_with_user();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store.clone(),
        EventBus::default(),
    );

    manager.connect();
    let mut server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();

    server.close();
    manager.wait_for(ConnectionState::Disconnected).await.unwrap();
    assert_eq!(store.get().reconnect_attempts, 1);

    manager.disconnect().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(store.get().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_reauthenticates_and_resets_attempts() {
    let (connector, mut accepted) = MockConnector::new();
    let store = store_with_user();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store.clone(),
        EventBus::default(),
    );

    manager.connect();
    let mut first = accepted.recv().await.unwrap();
    assert_eq!(first.next_frame().await["action"], "authenticate");

    first.close();
    let mut second = accepted.recv().await.unwrap();
    assert_eq!(second.next_frame().await["action"], "authenticate");
    manager.wait_for(ConnectionState::Connected).await.unwrap();

    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.gaps(), vec![Duration::from_secs(1)]);
    assert_eq!(store.get().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_from_error_starts_a_fresh_budget() {
    let (connector, mut accepted) = MockConnector::new();
    connector.refuse_all(true);
    let store = store_with_user();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store.clone(),
        EventBus::default(),
    );

    manager.connect();
    manager.wait_for(ConnectionState::Error).await.unwrap();
    assert_eq!(connector.attempts(), 6);

    connector.refuse_all(false);
    manager.connect();
    let _server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();

    assert_eq!(connector.attempts(), 7);
    let state = store.get();
    assert_eq!(state.reconnect_attempts, 0);
    assert!(state.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connect_ignored_while_connected() {
    let (connector, mut accepted) = MockConnector::new();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store_with_user(),
        EventBus::default(),
    );

    manager.connect();
    let _server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();

    manager.connect();
    manager.connect();
    settle().await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_state_is_mirrored_into_store() {
    let (connector, mut accepted) = MockConnector::new();
    let store = store_with_user();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector,
        store.clone(),
        EventBus::default(),
    );
    assert_eq!(store.get().connection_status, ConnectionState::Disconnected);

    manager.connect();
    let _server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();
    assert_eq!(store.get().connection_status, ConnectionState::Connected);

    manager.disconnect().await;
    assert_eq!(store.get().connection_status, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_closes_the_socket() {
    let (connector, mut accepted) = MockConnector::new();
    let manager = ConnectionManager::spawn(
        &connection_config(),
        connector.clone(),
        store_with_user(),
        EventBus::default(),
    );

    manager.connect();
    let mut server = accepted.recv().await.unwrap();
    manager.wait_for(ConnectionState::Connected).await.unwrap();
    drop(manager);

    server.closed_by_client().await;
    assert_eq!(connector.attempts(), 1);
}
