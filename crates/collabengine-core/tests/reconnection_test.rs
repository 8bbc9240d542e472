//! Reconnection and Keep-Alive Tests
//!
//! The supervision loop must heal dropped connections with exponential
//! backoff, give up after the configured number of attempts, and keep a
//! healthy connection alive with periodic heartbeats.
//!
//! All tests run on tokio's paused clock, so the 1s..16s backoff ladder
//! and the 30s heartbeat interval elapse instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use collabengine_core::{
    CollabEngine, CollabEvent, CollaboratorInfo, ConnectionState, DocumentId, Envelope, EventKind,
    MemoryHub, UserId,
};

// ============================================================================
// Test Utilities
// ============================================================================

fn engine(hub: &MemoryHub, doc: &str, user: &str) -> CollabEngine {
    CollabEngine::new(
        DocumentId::new(doc),
        CollaboratorInfo::new(UserId::new(user), user.to_string()),
        Arc::new(hub.connector()),
    )
}

fn record(engine: &CollabEngine, kind: EventKind) -> Arc<Mutex<Vec<CollabEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.on(kind, move |event| sink.lock().unwrap().push(event.clone()));
    events
}

/// Poll a condition; the sleeps drive the paused clock forward
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timeout waiting for condition");
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_unexpected_close() {
    let _ = tracing_subscriber::fmt::try_init();

    let hub = MemoryHub::new();
    let doc = DocumentId::new("doc-1");
    let engine = engine(&hub, "doc-1", "alice");
    let connects = record(&engine, EventKind::Connected);
    let disconnects = record(&engine, EventKind::Disconnected);

    wait_until(|| engine.is_connected()).await;
    assert_eq!(hub.dial_count(), 1);

    hub.sever(&doc);
    wait_until(|| !disconnects.lock().unwrap().is_empty()).await;

    // Healed automatically on a fresh connection
    wait_until(|| engine.is_connected() && hub.dial_count() == 2).await;
    assert_eq!(engine.reconnect_attempts(), 0);
    assert_eq!(connects.lock().unwrap().len(), 2);
    assert_eq!(disconnects.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_stops_after_max_attempts() {
    let hub = MemoryHub::new();
    // Initial dial plus all five retries refused
    hub.refuse_next(6);

    let engine = engine(&hub, "doc-1", "alice");
    let exhausted = record(&engine, EventKind::MaxReconnectsReached);

    wait_until(|| engine.connection_state() == ConnectionState::Failed).await;
    assert_eq!(exhausted.lock().unwrap().len(), 1);
    assert_eq!(hub.dial_count(), 6);
    assert!(!engine.is_connected());

    // Failed is terminal for the supervision task: no further dials
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(hub.dial_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_manual_open_restarts_after_failure() {
    let hub = MemoryHub::new();
    hub.refuse_next(6);

    let engine = engine(&hub, "doc-1", "alice");
    wait_until(|| engine.connection_state() == ConnectionState::Failed).await;

    // The endpoint is reachable again; a manual open starts a new cycle
    engine.open();
    wait_until(|| engine.is_connected()).await;
    assert_eq!(engine.reconnect_attempts(), 0);
    assert_eq!(hub.dial_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_sever_during_reconnect_backoff_keeps_counting() {
    let hub = MemoryHub::new();
    let doc = DocumentId::new("doc-1");
    hub.refuse_next(2);

    let engine = engine(&hub, "doc-1", "alice");

    // Two refusals, then the third dial lands
    wait_until(|| engine.is_connected()).await;
    assert_eq!(hub.dial_count(), 3);

    // A successful connection resets the attempt counter in full
    hub.sever(&doc);
    wait_until(|| engine.is_connected() && hub.dial_count() == 4).await;
    assert_eq!(engine.reconnect_attempts(), 0);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sent_on_interval() {
    let hub = MemoryHub::new();
    let doc = DocumentId::new("doc-1");
    let mut tap = hub.tap(&doc);

    let engine = engine(&hub, "doc-1", "alice");
    wait_until(|| engine.is_connected()).await;

    // The join announcement comes first
    let frame = tap.recv().await.expect("join frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "participant-joined");

    // Nothing else is sent until the first interval elapses
    assert!(tap.try_recv().is_err());
    tokio::time::sleep(Duration::from_secs(31)).await;

    let frame = tap.recv().await.expect("heartbeat frame");
    let envelope = Envelope::from_bytes(&frame).unwrap();
    assert_eq!(envelope.kind(), "heartbeat");
    assert_eq!(envelope.origin_user_id, UserId::new("alice"));

    // And again on the next interval
    tokio::time::sleep(Duration::from_secs(30)).await;
    let frame = tap.recv().await.expect("second heartbeat frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "heartbeat");
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_restarts_after_reconnect() {
    let hub = MemoryHub::new();
    let doc = DocumentId::new("doc-1");
    let mut tap = hub.tap(&doc);

    let engine = engine(&hub, "doc-1", "alice");
    wait_until(|| engine.is_connected()).await;
    let frame = tap.recv().await.expect("join frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "participant-joined");

    hub.sever(&doc);
    wait_until(|| engine.is_connected() && hub.dial_count() == 2).await;

    // Fresh connection announces itself, then resumes the keep-alive
    let frame = tap.recv().await.expect("rejoin frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "participant-joined");

    tokio::time::sleep(Duration::from_secs(31)).await;
    let frame = tap.recv().await.expect("heartbeat frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "heartbeat");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_heartbeat() {
    let hub = MemoryHub::new();
    let doc = DocumentId::new("doc-1");
    let mut tap = hub.tap(&doc);

    let engine = engine(&hub, "doc-1", "alice");
    wait_until(|| engine.is_connected()).await;
    let frame = tap.recv().await.expect("join frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "participant-joined");

    engine.disconnect();
    wait_until(|| engine.connection_state() == ConnectionState::Idle).await;

    // Departure is announced, then the line goes quiet for good
    let frame = tap.recv().await.expect("leave frame");
    assert_eq!(Envelope::from_bytes(&frame).unwrap().kind(), "participant-left");

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(tap.try_recv().is_err());
}
