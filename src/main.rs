//! Session Lobby Server
//!
//! Runs one authoritative lobby: participants connect over WebSocket, flag
//! readiness, and once everyone is ready a start request moves the whole
//! session to the target activity. Owner-produced entity state is relayed
//! from there on.

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_lobby_server::app::AppState;
use session_lobby_server::config::Config;
use session_lobby_server::http::build_router;
use session_lobby_server::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!(
        addr = %config.server_addr,
        target_activity = %config.target_activity,
        fixed_seed = config.spawn_seed.is_some(),
        "Starting session lobby server"
    );
    if config.client_origins.is_empty() {
        info!("CORS: any origin");
    } else {
        info!(origins = ?config.client_origins, "CORS: restricted origins");
    }

    // Only writer of lobby state
    let (state, coordinator) = AppState::new(config.clone());
    let coordinator_task = tokio::spawn(coordinator.run());

    let listener = TcpListener::bind(config.server_addr).await?;
    info!("Lobby endpoint: ws://{}/ws", config.server_addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Upgraded sockets outlive graceful shutdown and still hold handles
    coordinator_task.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
