use echohub::{config, routes, state};
use tracing::Level;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match config::ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let level = if config.mode.is_development() { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let port = config.port;
    let mode = config.mode.as_str();
    let state = state::AppState::new(config);

    let app = routes::app(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, mode, "echohub listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("server failed");
    tracing::info!("echohub stopped");
}

/// Resolve on Ctrl-C or SIGTERM, after closing every live session so the
/// websocket tasks finish and the server can drain.
async fn shutdown_signal(state: state::AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    let closed = state.router.shutdown().await;
    tracing::info!(closed, "shutdown: sessions closed");
}
