use super::*;
use crate::connection::Outbound;
use tokio::time::{Duration, timeout};

async fn recv_message(rx: &mut Outbound) -> Message {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("outbound receive timed out")
        .expect("outbound queue closed")
}

async fn assert_no_message(rx: &mut Outbound) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no outbound message"
    );
}

async fn connect(router: &MessageRouter) -> (ConnectionId, Outbound) {
    let (conn, mut rx) = Connection::new(8);
    let id = router.on_open(conn).await.expect("open should succeed");
    let welcome = recv_message(&mut rx).await;
    assert_eq!(welcome.kind(), crate::frame::MessageKind::Welcome);
    (id, rx)
}

#[tokio::test]
async fn open_registers_and_sends_welcome_once() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (conn, mut rx) = Connection::new(8);
    let id = router.on_open(conn).await.expect("open");

    let welcome = recv_message(&mut rx).await;
    assert_eq!(welcome.payload(), "Connected to server!");
    assert_no_message(&mut rx).await;

    let session = router.registry().get(id).await.expect("registered");
    assert_eq!(session.state(), ConnectionState::Open);
}

#[tokio::test]
async fn welcome_goes_only_to_new_connection() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (_first, mut rx_first) = connect(&router).await;
    let (_second, _rx_second) = connect(&router).await;

    assert_no_message(&mut rx_first).await;
}

#[tokio::test]
async fn open_rejects_duplicate_id() {
    let router = MessageRouter::new(SessionRegistry::new());
    let id = uuid::Uuid::new_v4();
    let (first, _rx1) = Connection::with_id(id, 8);
    let (second, mut rx2) = Connection::with_id(id, 8);

    router.on_open(first).await.expect("first open");
    assert_eq!(router.on_open(second).await, Err(RegistryError::Duplicate(id)));

    // Rejected connection's queue ends without a welcome.
    let end = timeout(Duration::from_millis(200), rx2.recv())
        .await
        .expect("rejected queue should end");
    assert!(end.is_none());
    assert_eq!(router.registry().len().await, 1);
}

#[tokio::test]
async fn frame_is_echoed_to_sender() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (id, mut rx) = connect(&router).await;

    let outcome = router.on_frame(id, b"hello").await;
    assert_eq!(outcome, FrameOutcome::Echoed { fanout: None });

    let reply = recv_message(&mut rx).await;
    assert_eq!(reply.kind(), crate::frame::MessageKind::Echo);
    assert_eq!(reply.payload(), "Echo: hello");
}

#[tokio::test]
async fn frames_are_echoed_in_arrival_order() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (id, mut rx) = connect(&router).await;

    for text in ["one", "two", "three"] {
        router.on_frame(id, text.as_bytes()).await;
    }
    for expected in ["Echo: one", "Echo: two", "Echo: three"] {
        assert_eq!(recv_message(&mut rx).await.payload(), expected);
    }
}

#[tokio::test]
async fn echo_does_not_reach_other_sessions_by_default() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (sender, _rx_sender) = connect(&router).await;
    let (_peer, mut rx_peer) = connect(&router).await;

    router.on_frame(sender, b"private").await;
    assert_no_message(&mut rx_peer).await;
}

#[tokio::test]
async fn broadcast_echo_fans_out_excluding_sender() {
    let router = MessageRouter::new(SessionRegistry::new()).with_broadcast_echo(true);
    let (sender, mut rx_sender) = connect(&router).await;
    let (_peer_a, mut rx_a) = connect(&router).await;
    let (_peer_b, mut rx_b) = connect(&router).await;

    let outcome = router.on_frame(sender, b"hi all").await;
    let FrameOutcome::Echoed { fanout: Some(report) } = outcome else {
        panic!("expected fan-out report, got {outcome:?}");
    };
    assert_eq!(report.delivered, 2);
    assert!(report.failed.is_empty());

    assert_eq!(recv_message(&mut rx_sender).await.payload(), "Echo: hi all");
    assert_no_message(&mut rx_sender).await;
    assert_eq!(recv_message(&mut rx_a).await.payload(), "Echo: hi all");
    assert_eq!(recv_message(&mut rx_b).await.payload(), "Echo: hi all");
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (id, mut rx) = connect(&router).await;

    let outcome = router.on_frame(id, &[0xc3, 0x28]).await;
    assert!(matches!(outcome, FrameOutcome::Malformed(DecodeError::InvalidUtf8 { .. })));
    assert_no_message(&mut rx).await;

    let session = router.registry().get(id).await.expect("still registered");
    assert_eq!(session.state(), ConnectionState::Open);

    router.on_frame(id, b"after").await;
    assert_eq!(recv_message(&mut rx).await.payload(), "Echo: after");
}

#[tokio::test]
async fn frame_for_unknown_connection_is_dropped() {
    let router = MessageRouter::new(SessionRegistry::new());
    assert_eq!(router.on_frame(uuid::Uuid::new_v4(), b"ghost").await, FrameOutcome::NotOpen);
}

#[tokio::test]
async fn frame_while_connecting_is_dropped() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (conn, mut rx) = Connection::new(8);
    let id = router.registry().add(conn).await.expect("add");

    assert_eq!(router.on_frame(id, b"too early").await, FrameOutcome::NotOpen);
    assert_no_message(&mut rx).await;
}

#[tokio::test]
async fn echo_to_saturated_queue_reports_failure() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (conn, mut rx) = Connection::new(1);
    let id = router.on_open(conn).await.expect("open");

    // Welcome still sits in the single-slot queue.
    assert_eq!(router.on_frame(id, b"x").await, FrameOutcome::SendFailed(SendError::QueueFull));

    assert_eq!(recv_message(&mut rx).await.kind(), crate::frame::MessageKind::Welcome);
    assert!(router.registry().get(id).await.is_some());
}

#[tokio::test]
async fn close_removes_session_and_is_idempotent() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (id, mut rx) = connect(&router).await;
    let handle = router.registry().get(id).await.expect("registered");

    assert!(router.on_close(id).await);
    assert!(!router.on_close(id).await);
    assert!(router.registry().get(id).await.is_none());
    assert_eq!(handle.state(), ConnectionState::Closed);

    let end = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("closed queue should end");
    assert!(end.is_none());
    assert_eq!(router.on_frame(id, b"late").await, FrameOutcome::NotOpen);
}

#[tokio::test]
async fn kick_disconnects_only_target() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (target, _rx_target) = connect(&router).await;
    let (other, mut rx_other) = connect(&router).await;

    assert!(router.kick(target).await);
    assert!(!router.kick(target).await);
    assert!(router.registry().get(target).await.is_none());

    router.on_frame(other, b"still here").await;
    assert_eq!(recv_message(&mut rx_other).await.payload(), "Echo: still here");
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (_a, _rx_a) = connect(&router).await;
    let (_b, _rx_b) = connect(&router).await;

    assert_eq!(router.shutdown().await, 2);
    assert!(router.registry().is_empty().await);
    assert_eq!(router.shutdown().await, 0);
}

#[tokio::test]
async fn open_keeps_session_when_welcome_cannot_be_delivered() {
    let router = MessageRouter::new(SessionRegistry::new());
    let (conn, rx) = Connection::new(8);
    drop(rx);

    let id = router.on_open(conn).await.expect("registration still succeeds");

    let session = router.registry().get(id).await.expect("registered");
    assert_eq!(session.state(), ConnectionState::Open);
    assert_eq!(session.send(Message::raw("x")), Err(SendError::Closed));

    assert!(router.on_close(id).await);
    assert!(router.registry().is_empty().await);
}
