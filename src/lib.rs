//! echohub — real-time WebSocket echo endpoint.
//!
//! ARCHITECTURE
//! ============
//! - `frame` - immutable `Message`, wire encoding, inbound decoding
//! - `connection` - one client's bounded outbound queue and lifecycle state
//! - `registry` - id -> connection map with serialized mutation and broadcast
//! - `router` - per-connection state machine (open / frame / close)
//! - `routes` - axum HTTP + websocket front-end
//!
//! `state::AppState` ties one registry and router to the front-end; `main`
//! builds it from `config::ServerConfig` and tears it down on shutdown.

pub mod config;
pub mod connection;
pub mod frame;
pub mod registry;
pub mod router;
pub mod routes;
pub mod state;
