//! WebSocket handler — transport adapter for the message router.
//!
//! DESIGN
//! ======
//! On upgrade, builds a `Connection`, hands it to the router, and enters a
//! `select!` loop:
//! - Incoming socket frames → `router.on_frame`
//! - Outbound queue → encode + write to the socket
//!
//! Inbound frames for one client are handled one at a time in arrival
//! order. The loop ends when the client closes, the socket errors, or the
//! outbound queue is released by a kick or shutdown.
//!
//! Every socket write is bounded: `WRITE_TIMEOUT` for a live client, and
//! `CLOSE_GRACE` once the connection has been closed server-side, so a
//! client that stopped reading cannot hold the task open.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `on_open` (registers, queues the welcome)
//! 2. Text/binary frames → `on_frame` (queues the echo)
//! 3. Close / error / queue released → `on_close`

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId, Outbound};
use crate::frame::Message;
use crate::state::AppState;

/// Longest a single socket write may take for a live client.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long queued messages may still flush after a server-side close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let (conn, mut outbound) = Connection::new(state.config.queue_capacity);

    let Ok(client_id) = state.router.on_open(conn).await else {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    };

    // Set when the server side released the queue (kick or shutdown).
    let mut server_closed = false;
    // Fixed at the first write that observes the close.
    let mut flush_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    WsMessage::Text(text) => {
                        state.router.on_frame(client_id, text.as_str().as_bytes()).await;
                    }
                    WsMessage::Binary(bytes) => {
                        state.router.on_frame(client_id, &bytes).await;
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            out = outbound.recv() => {
                let Some(out) = out else {
                    server_closed = true;
                    break;
                };
                if write_bounded(&mut socket, &mut outbound, &mut flush_deadline, client_id, &out).await.is_err() {
                    break;
                }
            }
        }
    }

    state.router.on_close(client_id).await;
    if server_closed {
        let _ = timeout(CLOSE_GRACE, socket.send(WsMessage::Close(None))).await;
    }
    info!(%client_id, server_closed, "ws: connection finished");
}

// =============================================================================
// HELPERS
// =============================================================================

/// Write one message, giving up after `WRITE_TIMEOUT`, or once
/// `CLOSE_GRACE` has passed since the connection was closed.
async fn write_bounded(
    socket: &mut WebSocket,
    outbound: &mut Outbound,
    flush_deadline: &mut Option<Instant>,
    client_id: ConnectionId,
    msg: &Message,
) -> Result<(), ()> {
    let closed_then_grace = async {
        outbound.closed().await;
        let deadline = *flush_deadline.get_or_insert_with(|| Instant::now() + CLOSE_GRACE);
        sleep_until(deadline).await;
    };
    tokio::select! {
        sent = timeout(WRITE_TIMEOUT, send_message(socket, client_id, msg)) => {
            sent.unwrap_or_else(|_| {
                warn!(%client_id, "ws: write timed out");
                Err(())
            })
        }
        () = closed_then_grace => {
            warn!(%client_id, "ws: write abandoned after close");
            Err(())
        }
    }
}

async fn send_message(socket: &mut WebSocket, client_id: ConnectionId, msg: &Message) -> Result<(), ()> {
    let json = match msg.encode() {
        Ok(j) => j,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: failed to serialize message");
            return Err(());
        }
    };
    debug!(%client_id, kind = msg.kind().as_str(), "ws: send frame");
    socket
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
