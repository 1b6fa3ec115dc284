//! Session registry — live connections keyed by id.
//!
//! DESIGN
//! ======
//! A `tokio::sync::RwLock` over a `HashMap` gives single-writer mutation
//! (add / remove / `close_all`) and concurrent reads (get / broadcast).
//! Connections are stored as `Arc<Connection>` so a lookup can hand out a
//! handle that outlives the read guard.
//!
//! Broadcast is best-effort: every target gets a non-blocking `send`, and
//! per-target failures are collected into the report instead of aborting
//! the fan-out. One slow or dead client never delays the others.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionId, ConnectionState, SendError};
use crate::frame::{ErrorCode, Message};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("connection id already registered: {0}")]
    Duplicate(ConnectionId),
}

impl ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Duplicate(_) => "E_DUPLICATE_SESSION",
        }
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions whose queue accepted the message.
    pub delivered: usize,
    /// Sessions whose send failed, with the reason.
    pub failed: Vec<(ConnectionId, SendError)>,
}

impl BroadcastReport {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ConnectionId, Arc<Connection>>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the id is already present. The existing session is
    /// left untouched.
    pub async fn add(&self, conn: Connection) -> Result<ConnectionId, RegistryError> {
        let id = conn.id();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        sessions.insert(id, Arc::new(conn));
        debug!(%id, total = sessions.len(), "registry: session added");
        Ok(id)
    }

    /// Remove a session. `None` if it was not present, so repeated close
    /// signals are harmless.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id);
        if removed.is_some() {
            debug!(%id, total = sessions.len(), "registry: session removed");
        }
        removed
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Send `msg` to every Open session except `exclude`.
    pub async fn broadcast(&self, msg: &Message, exclude: Option<ConnectionId>) -> BroadcastReport {
        let sessions = self.sessions.read().await;
        let mut report = BroadcastReport::default();

        for (id, conn) in sessions.iter() {
            if exclude == Some(*id) || conn.state() != ConnectionState::Open {
                continue;
            }
            match conn.send(msg.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(%id, code = e.error_code(), "registry: broadcast target failed");
                    report.failed.push((*id, e));
                }
            }
        }
        report
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Close and remove every session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "registry: closed all sessions");
        }
        drained.len()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
