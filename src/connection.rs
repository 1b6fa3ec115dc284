//! Connection — one client's outbound queue and lifecycle state.
//!
//! DESIGN
//! ======
//! The registry owns each `Connection`; the transport task owns the matching
//! `Outbound` receiver and writes whatever arrives there to the socket.
//! `send` never blocks: a saturated queue is reported as `QueueFull` and the
//! caller decides whether to drop the message or disconnect the client.
//!
//! `close` drops the queue's sender and fires the close signal. The
//! transport drains what was already queued, then sees end-of-stream and
//! exits its loop. A socket write already in flight races the signal, so
//! a client that stopped reading cannot pin the transport after a close.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::frame::{ErrorCode, Message};

/// Opaque connection identifier.
pub type ConnectionId = Uuid;

/// Receiving half of a connection's outbound queue, held by the transport.
pub struct Outbound {
    rx: mpsc::Receiver<Message>,
    closed: watch::Receiver<bool>,
}

impl Outbound {
    /// Next queued message. `None` once the connection is closed and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Resolves once the connection has been closed, or dropped without
    /// ever being registered.
    pub async fn closed(&mut self) {
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}

/// Default outbound queue depth per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// STATE
// =============================================================================

/// Lifecycle position. Ordered so transitions can only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Connecting or Open.
    #[must_use]
    pub fn is_live(self) -> bool {
        self <= Self::Open
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue full")]
    QueueFull,
    #[error("connection closed")]
    Closed,
}

impl ErrorCode for SendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::QueueFull => "E_QUEUE_FULL",
            Self::Closed => "E_CONNECTION_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::QueueFull)
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

pub struct Connection {
    id: ConnectionId,
    state: AtomicU8,
    /// `None` once the connection has been closed.
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    closed: watch::Sender<bool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection in `Connecting` with a fresh id.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Outbound) {
        Self::with_id(Uuid::new_v4(), capacity)
    }

    /// Create a connection with a caller-chosen id. A zero capacity is
    /// raised to one.
    #[must_use]
    pub fn with_id(id: ConnectionId, capacity: usize) -> (Self, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);
        let conn = Self {
            id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound: Mutex::new(Some(tx)),
            closed: closed_tx,
        };
        (conn, Outbound { rx, closed: closed_rx })
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move forward to `to`. Returns the state held before the call.
    fn advance(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.fetch_max(to as u8, Ordering::AcqRel))
    }

    /// Connecting -> Open. No effect once closing has started.
    pub fn open(&self) {
        self.advance(ConnectionState::Open);
    }

    /// Enqueue `msg` for the transport writer.
    ///
    /// # Errors
    ///
    /// `Closed` when the connection is Closing/Closed or the transport has
    /// dropped its receiver; `QueueFull` when the queue is saturated.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        if !self.state().is_live() {
            return Err(SendError::Closed);
        }
        let outbound = self
            .outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Close flips the state before taking this lock.
        if !self.state().is_live() {
            return Err(SendError::Closed);
        }
        let Some(tx) = outbound.as_ref() else {
            return Err(SendError::Closed);
        };
        tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Closing -> Closed, releasing the outbound queue. Idempotent.
    pub fn close(&self) {
        if self.advance(ConnectionState::Closing) == ConnectionState::Closed {
            return;
        }
        let released = self
            .outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        drop(released);
        self.closed.send_replace(true);
        self.advance(ConnectionState::Closed);
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
