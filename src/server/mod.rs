//! WebSocket push server for the dashboard
//!
//! [`WebSocketServer`] is an explicit, cloneable handle. The application
//! builds one at startup and passes it to whatever needs to broadcast;
//! independent instances do not share state.
//!
//! Clients receive JSON text frames:
//! - `{"type":"connected","message":"WebSocket connection established"}` on connect
//! - `{"type":"update","timestamp":<ms>,"data":<snapshot>}` on every broadcast tick
//!
//! Dead peers are only noticed when the OS reports close or error on the
//! socket. There is no ping/pong keepalive.

pub mod broadcast;
pub mod connection;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod registry;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::SnapshotSource;
use crate::error::AppError;

pub use broadcast::{update_envelope, BroadcastScheduler, UPDATE_MESSAGE_TYPE};
pub use connection::{CLIENT_QUEUE_FRAMES, WELCOME_MESSAGE};
pub use frame::{encode_text_frame, FrameHeader};
pub use handshake::{derive_accept_key, switching_protocols, UpgradeRequest, WS_GUID};
pub use http::{router, serve, HttpOptions};
pub use registry::{Client, ClientId, ClientRegistry, FrameSink, Outbound};

/// Default broadcast period
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(5_000);

struct Inner {
    registry: ClientRegistry,
    scheduler: BroadcastScheduler,
    started: Instant,
}

#[derive(Clone)]
pub struct WebSocketServer {
    inner: Arc<Inner>,
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketServer {
    pub fn new() -> Self {
        let registry = ClientRegistry::new();
        Self {
            inner: Arc::new(Inner {
                scheduler: BroadcastScheduler::new(registry.clone()),
                registry,
                started: Instant::now(),
            }),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Complete a WebSocket upgrade on a raw socket, writing the `101` here.
    pub async fn handle_upgrade<S>(&self, request: &UpgradeRequest, stream: S) -> Result<ClientId, AppError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.handle_upgrade_from(request, stream, None).await
    }

    /// Same as [`Self::handle_upgrade`], recording the peer address for logs.
    pub async fn handle_upgrade_from<S>(
        &self,
        request: &UpgradeRequest,
        stream: S,
        peer: Option<SocketAddr>,
    ) -> Result<ClientId, AppError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        connection::accept(&self.inner.registry, request, stream, peer).await
    }

    /// Track a stream whose `101` response was already sent by the HTTP layer.
    pub async fn register_upgraded<S>(&self, stream: S, peer: Option<SocketAddr>) -> Result<ClientId, AppError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        connection::register(&self.inner.registry, stream, peer).await
    }

    /// Push a message to every client, outside the periodic schedule.
    ///
    /// Strings are sent verbatim; JSON values are serialized first.
    pub async fn broadcast(&self, data: impl Into<Outbound>) {
        self.inner.registry.broadcast(data).await;
    }

    /// Serialize any value as JSON and push it to every client.
    pub async fn broadcast_json<T: Serialize + ?Sized>(&self, value: &T) {
        self.inner.registry.broadcast_json(value).await;
    }

    pub async fn client_count(&self) -> usize {
        self.inner.registry.client_count().await
    }

    /// Broadcast a snapshot from `source` every `interval` while clients are connected.
    pub async fn start_broadcasting<S: SnapshotSource>(&self, source: S, interval: Duration) -> Result<(), AppError> {
        self.inner.scheduler.start(source, interval).await
    }

    pub async fn stop_broadcasting(&self) {
        self.inner.scheduler.stop().await;
    }

    pub async fn is_broadcasting(&self) -> bool {
        self.inner.scheduler.is_running().await
    }
}
