//! HTTP front end
//!
//! Plain requests go through an axum [`Router`] (health document, 404
//! fallback). WebSocket upgrade requests get their `101` from the
//! connection's hyper service and the upgraded stream is handed to the
//! client registry. A refused handshake fails the service call, so hyper
//! drops the socket without writing a response.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, MIN_REQUEST_HEAD_BYTES};
use crate::error::AppError;

use super::handshake::{derive_accept_key, switching_protocols, UpgradeRequest};
use super::WebSocketServer;

/// Per-connection HTTP settings
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub max_request_head_bytes: usize,
    pub health_path: String,
    /// Deadline for a client to finish sending its request head
    pub header_read_timeout: Duration,
}

impl From<&ServerConfig> for HttpOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_request_head_bytes: config.max_request_head_bytes,
            health_path: config.health_path.clone(),
            header_read_timeout: config.header_read_timeout(),
        }
    }
}

/// Routes for everything that is not a WebSocket upgrade.
pub fn router(server: WebSocketServer, health_path: &str) -> Router {
    Router::new()
        .route(health_path, get(health_handler))
        .fallback(not_found)
        .with_state(server)
}

/// Accept connections until `shutdown_rx` fires.
pub async fn serve(
    listener: TcpListener,
    server: WebSocketServer,
    options: HttpOptions,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AppError> {
    let app = router(server.clone(), &options.health_path);
    let options = Arc::new(options);
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "Dashboard server listening");
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            app.clone(),
                            server.clone(),
                            options.clone(),
                        ));
                    }
                    Err(e) => {
                        // Per-connection accept failures (e.g. EMFILE) must not end the loop.
                        error!(error = %e, "Accept failed");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    server: WebSocketServer,
    options: Arc<HttpOptions>,
) {
    let service = service_fn(move |request: Request<Incoming>| {
        dispatch(request, app.clone(), server.clone(), peer)
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(options.header_read_timeout)
        .max_buf_size(options.max_request_head_bytes.max(MIN_REQUEST_HEAD_BYTES));

    let connection = builder
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    if let Err(e) = connection.await {
        debug!(peer = %peer, error = %e, "HTTP connection ended with error");
    }
}

async fn dispatch(
    request: Request<Incoming>,
    app: Router,
    server: WebSocketServer,
    peer: SocketAddr,
) -> Result<Response, AppError> {
    let head = UpgradeRequest::from(&request);
    if head.is_websocket_upgrade() {
        return upgrade(request, &head, server, peer);
    }

    Ok(app
        .oneshot(request)
        .await
        .unwrap_or_else(|never: Infallible| match never {}))
}

fn upgrade(
    mut request: Request<Incoming>,
    head: &UpgradeRequest,
    server: WebSocketServer,
    peer: SocketAddr,
) -> Result<Response, AppError> {
    let key = match head.websocket_key() {
        Ok(key) => key,
        Err(e) => {
            warn!(peer = %peer, error = %e, "WebSocket handshake rejected");
            return Err(e.into());
        }
    };
    let response = switching_protocols(&derive_accept_key(key))?;

    let on_upgrade = hyper::upgrade::on(&mut request);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                if let Err(e) = server.register_upgraded(TokioIo::new(upgraded), Some(peer)).await {
                    warn!(peer = %peer, error = %e, "Failed to register WebSocket client");
                }
            }
            Err(e) => debug!(peer = %peer, error = %e, "Upgrade never completed"),
        }
    });

    Ok(response)
}

async fn health_handler(State(server): State<WebSocketServer>) -> Json<serde_json::Value> {
    Json(health_document(&server).await)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

/// `{"status","timestamp","uptime","clients"}`
pub async fn health_document(server: &WebSocketServer) -> serde_json::Value {
    json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": server.uptime().as_secs_f64(),
        "clients": server.client_count().await,
    })
}
