//! Dashboard WebSocket server entry point
//!
//! 1. Environment + logging
//! 2. Configuration (YAML file, env overrides)
//! 3. WebSocketServer + periodic status broadcast
//! 4. HTTP listener
//! 5. Ctrl+C graceful shutdown

use std::path::Path;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use dashboard_ws::config::{self, constants, ServerConfig};
use dashboard_ws::core::StatusSource;
use dashboard_ws::server::{self, HttpOptions};
use dashboard_ws::WebSocketServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    config::init_logging();

    let config_path = constants::config_path();
    let mut config = match config::load_config(Path::new(&config_path)) {
        Ok(cfg) => {
            info!(path = %config_path, "Configuration loaded");
            cfg
        }
        Err(e) => {
            warn!(error = %e, "Using default configuration");
            ServerConfig::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;

    info!(
        bind_addr = %config.bind_addr,
        broadcast_interval_ms = config.broadcast_interval_ms,
        health_path = %config.health_path,
        "Starting dashboard server"
    );

    let ws = WebSocketServer::new();
    ws.start_broadcasting(StatusSource::new(ws.registry().clone()), config.broadcast_interval())
        .await?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let server_handle = tokio::spawn(server::serve(
        listener,
        ws.clone(),
        HttpOptions::from(&config),
        shutdown_rx,
    ));

    match signal::ctrl_c().await {
        Ok(()) => info!("[SHUTDOWN] Graceful shutdown initiated"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }

    ws.stop_broadcasting().await;
    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Err(e)) => error!(error = %e, "Listener failed"),
        Err(e) => error!(error = %e, "Listener task panicked"),
        Ok(Ok(())) => {}
    }

    info!(clients = ws.client_count().await, "[SHUTDOWN] Clean exit");
    Ok(())
}
