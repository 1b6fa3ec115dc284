//! Message router — the per-connection state machine.
//!
//! LIFECYCLE
//! =========
//! 1. `on_open`: register (Connecting), move to Open, send the welcome
//! 2. `on_frame`: decode, echo back to the sender, optionally fan out
//! 3. `on_close` / `kick`: remove from the registry, then close (Closed)
//!
//! Each transport event maps to exactly one handler call, and every
//! handler reports what it did, so the control flow can be exercised
//! without a socket. The router only ever holds connection ids; the
//! registry owns the connections.

use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionId, ConnectionState, SendError};
use crate::frame::{DecodeError, ErrorCode, Message, decode_frame};
use crate::registry::{BroadcastReport, RegistryError, SessionRegistry};

// =============================================================================
// OUTCOME
// =============================================================================

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Echo queued for the sender. `fanout` is set when broadcast echo is on.
    Echoed { fanout: Option<BroadcastReport> },
    /// Echo could not be queued for the sender; the message was dropped.
    SendFailed(SendError),
    /// Frame was not valid text; dropped, connection stays open.
    Malformed(DecodeError),
    /// Connection unknown or not Open; dropped silently.
    NotOpen,
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Clone)]
pub struct MessageRouter {
    registry: SessionRegistry,
    broadcast_echo: bool,
}

impl MessageRouter {
    #[must_use]
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry, broadcast_echo: false }
    }

    /// Also broadcast each echo to every other Open session.
    #[must_use]
    pub fn with_broadcast_echo(mut self, enabled: bool) -> Self {
        self.broadcast_echo = enabled;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Transport accepted a connection.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the id is already registered. The rejected
    /// connection is dropped, which ends its outbound queue.
    pub async fn on_open(&self, conn: Connection) -> Result<ConnectionId, RegistryError> {
        let id = match self.registry.add(conn).await {
            Ok(id) => id,
            Err(e) => {
                error!(code = e.error_code(), error = %e, "router: registration rejected");
                return Err(e);
            }
        };

        // Closed concurrently between add and here: nothing to greet.
        let Some(conn) = self.registry.get(id).await else {
            return Ok(id);
        };
        conn.open();

        if let Err(e) = conn.send(Message::welcome()) {
            warn!(%id, code = e.error_code(), "router: welcome not delivered");
        }
        info!(%id, "router: client connected");
        Ok(id)
    }

    /// Transport delivered one inbound frame for `id`.
    pub async fn on_frame(&self, id: ConnectionId, bytes: &[u8]) -> FrameOutcome {
        let Some(conn) = self.registry.get(id).await else {
            return FrameOutcome::NotOpen;
        };
        if conn.state() != ConnectionState::Open {
            return FrameOutcome::NotOpen;
        }

        let payload = match decode_frame(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(%id, code = e.error_code(), error = %e, "router: malformed frame dropped");
                return FrameOutcome::Malformed(e);
            }
        };
        debug!(%id, len = payload.len(), "router: recv frame");

        let reply = Message::echo(payload);
        let fanout_msg = self.broadcast_echo.then(|| reply.clone());

        if let Err(e) = conn.send(reply) {
            warn!(%id, code = e.error_code(), retryable = e.retryable(), "router: echo dropped");
            return FrameOutcome::SendFailed(e);
        }

        let fanout = match fanout_msg {
            Some(msg) => {
                let report = self.registry.broadcast(&msg, Some(id)).await;
                if !report.failed.is_empty() {
                    warn!(%id, delivered = report.delivered, failed = report.failed_count(), "router: fan-out partially failed");
                }
                Some(report)
            }
            None => None,
        };

        FrameOutcome::Echoed { fanout }
    }

    /// Transport closed or errored. Safe to call more than once.
    /// Returns whether a live session was torn down.
    pub async fn on_close(&self, id: ConnectionId) -> bool {
        let closed = self.teardown(id).await;
        if closed {
            info!(%id, "router: client disconnected");
        }
        closed
    }

    /// Server-initiated disconnect. The transport loop ends once the
    /// queued messages are flushed.
    pub async fn kick(&self, id: ConnectionId) -> bool {
        let closed = self.teardown(id).await;
        if closed {
            info!(%id, "router: client kicked");
        }
        closed
    }

    /// Close every session. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        self.registry.close_all().await
    }

    async fn teardown(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.registry.remove(id).await else {
            return false;
        };
        conn.close();
        true
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
