//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the plain HTTP endpoints and the websocket upgrade under a single
//! Axum router. CORS is wide open and every request is traced.

pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Body served at `/`.
pub const INDEX_TEXT: &str = "WebSocket demo running!";

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::handle_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> &'static str {
    INDEX_TEXT
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
