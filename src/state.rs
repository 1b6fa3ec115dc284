//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It is built once in `main`, owns the single session registry (through
//! the router), and is torn down explicitly at shutdown. There are no
//! process-wide globals.

use crate::config::ServerConfig;
use crate::registry::SessionRegistry;
use crate::router::MessageRouter;

/// Clone is required by Axum; the router's registry is Arc-backed.
#[derive(Clone)]
pub struct AppState {
    pub router: MessageRouter,
    pub config: ServerConfig,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let router = MessageRouter::new(SessionRegistry::new()).with_broadcast_echo(config.broadcast_echo);
        Self { router, config }
    }
}
