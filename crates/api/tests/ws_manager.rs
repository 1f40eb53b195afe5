//! Unit tests for `WsManager`.
//!
//! These tests exercise the WebSocket connection manager directly, without
//! performing any HTTP upgrades. They verify add/remove semantics, per-job
//! relay lifecycle, fan-out delivery, and graceful shutdown behaviour.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;

use medialoom_api::ws::WsManager;
use medialoom_core::job::JobStatus;
use medialoom_events::{ProgressBus, ProgressEvent};

fn manager() -> Arc<WsManager> {
    Arc::new(WsManager::new())
}

/// Receive the next Text frame within a bounded wait.
async fn next_text(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for message")
        .expect("Channel closed");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("Frame must be JSON"),
        other => panic!("Expected Text frame, got: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: add/remove connection bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = manager();

    assert_eq!(manager.connection_count().await, 0);
    assert_eq!(manager.relay_count().await, 0);
}

#[tokio::test]
async fn add_and_remove_update_connection_count() {
    let manager = manager();

    let _rx = manager.add("conn-1".to_string()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn remove_unknown_id_is_noop() {
    let manager = manager();

    let _rx = manager.add("conn-1".to_string()).await;
    manager.remove("nonexistent").await;

    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: subscribing starts a relay; the last unsubscribe stops it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_starts_relay_and_unsubscribe_stops_it() {
    let manager = manager();
    let bus = ProgressBus::default();
    let job_id = uuid::Uuid::new_v4();

    let _rx1 = manager.add("conn-1".to_string()).await;
    let _rx2 = manager.add("conn-2".to_string()).await;

    assert!(manager.subscribe("conn-1", job_id, &bus).await);
    assert!(manager.subscribe("conn-2", job_id, &bus).await);
    assert_eq!(manager.relay_count().await, 1);

    assert!(manager.unsubscribe("conn-1", job_id).await);
    assert_eq!(manager.relay_count().await, 1);

    assert!(manager.unsubscribe("conn-2", job_id).await);
    assert_eq!(manager.relay_count().await, 0);
}

#[tokio::test]
async fn duplicate_subscribe_is_rejected() {
    let manager = manager();
    let bus = ProgressBus::default();
    let job_id = uuid::Uuid::new_v4();

    let _rx = manager.add("conn-1".to_string()).await;

    assert!(manager.subscribe("conn-1", job_id, &bus).await);
    assert!(!manager.subscribe("conn-1", job_id, &bus).await);
}

#[tokio::test]
async fn subscribe_with_unknown_connection_is_rejected() {
    let manager = manager();
    let bus = ProgressBus::default();

    assert!(!manager.subscribe("ghost", uuid::Uuid::new_v4(), &bus).await);
    assert_eq!(manager.relay_count().await, 0);
}

#[tokio::test]
async fn unsubscribe_without_subscription_returns_false() {
    let manager = manager();

    let _rx = manager.add("conn-1".to_string()).await;
    assert!(!manager.unsubscribe("conn-1", uuid::Uuid::new_v4()).await);
}

// ---------------------------------------------------------------------------
// Test: relay forwards bus events only to subscribed connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_forwards_progress_to_subscribers_only() {
    let manager = manager();
    let bus = ProgressBus::default();
    let job_id = uuid::Uuid::new_v4();

    let mut subscribed = manager.add("conn-1".to_string()).await;
    let mut bystander = manager.add("conn-2".to_string()).await;
    assert!(manager.subscribe("conn-1", job_id, &bus).await);

    bus.publish(ProgressEvent::now(
        job_id,
        JobStatus::Running,
        42.0,
        Some("item-3".into()),
    ))
    .await;

    let frame = next_text(&mut subscribed).await;
    assert_eq!(frame["type"], "progress");
    assert_eq!(frame["status"], "running");
    assert_eq!(frame["progress"], 42.0);
    assert_eq!(frame["current_item"], "item-3");

    assert!(
        bystander.try_recv().is_err(),
        "Unsubscribed connection must not receive the event"
    );
}

// ---------------------------------------------------------------------------
// Test: bus channel closure (terminal job) tears the relay down
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_stops_when_job_channel_closes() {
    let manager = manager();
    let bus = ProgressBus::default();
    let job_id = uuid::Uuid::new_v4();

    let mut rx = manager.add("conn-1".to_string()).await;
    assert!(manager.subscribe("conn-1", job_id, &bus).await);

    bus.publish(ProgressEvent::now(job_id, JobStatus::Completed, 100.0, None))
        .await;
    bus.release(job_id).await;

    let frame = next_text(&mut rx).await;
    assert_eq!(frame["type"], "progress");
    assert_eq!(frame["status"], "completed");

    // The relay notices the closed channel and removes itself.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while manager.relay_count().await != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Relay was not torn down after channel closure"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The subscription is forgotten, so subscribing again works.
    assert!(manager.subscribe("conn-1", job_id, &bus).await);
}

// ---------------------------------------------------------------------------
// Test: removing a connection drops its subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_connection_stops_orphaned_relays() {
    let manager = manager();
    let bus = ProgressBus::default();
    let job_a = uuid::Uuid::new_v4();
    let job_b = uuid::Uuid::new_v4();

    let _rx = manager.add("conn-1".to_string()).await;
    assert!(manager.subscribe("conn-1", job_a, &bus).await);
    assert!(manager.subscribe("conn-1", job_b, &bus).await);
    assert_eq!(manager.relay_count().await, 2);

    manager.remove("conn-1").await;
    assert_eq!(manager.relay_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = manager();
    let bus = ProgressBus::default();

    let mut rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;
    assert!(manager.subscribe("conn-1", uuid::Uuid::new_v4(), &bus).await);
    assert_eq!(manager.connection_count().await, 2);

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert_eq!(manager.relay_count().await, 0);

    let msg1 = rx1.recv().await.expect("rx1 should receive Close");
    assert!(
        matches!(msg1, Message::Close(None)),
        "Expected Close(None), got: {msg1:?}"
    );

    let msg2 = rx2.recv().await.expect("rx2 should receive Close");
    assert!(
        matches!(msg2, Message::Close(None)),
        "Expected Close(None), got: {msg2:?}"
    );

    // After Close, the channel should be closed (no more messages).
    assert!(
        rx1.recv().await.is_none(),
        "Channel should be closed after shutdown"
    );
}

// ---------------------------------------------------------------------------
// Test: fan_out skips closed channels without panicking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fan_out_skips_closed_channels() {
    let manager = manager();
    let bus = ProgressBus::default();
    let job_id = uuid::Uuid::new_v4();

    let rx1 = manager.add("conn-1".to_string()).await;
    let mut rx2 = manager.add("conn-2".to_string()).await;
    assert!(manager.subscribe("conn-1", job_id, &bus).await);
    assert!(manager.subscribe("conn-2", job_id, &bus).await);

    // Drop rx1 to close its channel.
    drop(rx1);

    bus.publish(ProgressEvent::now(job_id, JobStatus::Running, 10.0, None))
        .await;

    // conn-2 still receives the event.
    let frame = next_text(&mut rx2).await;
    assert_eq!(frame["type"], "progress");
}
