//! Client registry and best-effort fan-out
//!
//! A client lives in the registry exactly as long as its stream is open.
//! Any failed send is treated as a disconnect: the client is removed and
//! delivery to everyone else continues.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::AppError;

use super::frame::encode_text_frame;

/// Per-instance, monotonically increasing client identifier
pub type ClientId = u64;

/// Write side of a client connection.
///
/// Implementations must not block; a returned error means the peer is gone.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: Bytes) -> Result<(), AppError>;
}

/// Frames are queued for the connection's writer task.
///
/// A full queue means the peer stopped reading; that counts as a failed send.
impl FrameSink for mpsc::Sender<Bytes> {
    fn send_frame(&self, frame: Bytes) -> Result<(), AppError> {
        self.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => AppError::Send("client queue full".to_string()),
            TrySendError::Closed(_) => AppError::Send("client writer closed".to_string()),
        })
    }
}

/// One accepted WebSocket connection
pub struct Client {
    id: ClientId,
    peer: Option<SocketAddr>,
    sink: Box<dyn FrameSink>,
}

impl Client {
    pub fn new(id: ClientId, peer: Option<SocketAddr>, sink: Box<dyn FrameSink>) -> Self {
        Self { id, peer, sink }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Frame `text` and hand it to the sink.
    pub fn send(&self, text: &str) -> Result<(), AppError> {
        self.sink.send_frame(encode_text_frame(text))
    }

    fn send_encoded(&self, frame: Bytes) -> Result<(), AppError> {
        self.sink.send_frame(frame)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Message accepted by [`ClientRegistry::broadcast`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Already serialized; sent verbatim
    Text(String),
    /// Serialized with `serde_json` before framing
    Json(serde_json::Value),
}

impl Outbound {
    pub fn into_text(self) -> String {
        match self {
            Outbound::Text(text) => text,
            Outbound::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Outbound::Text(text)
    }
}

impl From<&str> for Outbound {
    fn from(text: &str) -> Self {
        Outbound::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Outbound {
    fn from(value: serde_json::Value) -> Self {
        Outbound::Json(value)
    }
}

/// Set of live clients, keyed by identity.
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<ClientId, Arc<Client>>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh identifier.
    pub fn allocate_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert a client. Returns `false` if it was already present.
    pub async fn add(&self, client: Arc<Client>) -> bool {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.id) {
            return false;
        }
        clients.insert(client.id, client);
        true
    }

    /// Remove a client. Removing an absent client is a no-op returning `false`.
    pub async fn remove(&self, id: ClientId) -> bool {
        self.clients.write().await.remove(&id).is_some()
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Send to one client, dropping it from the registry on failure.
    pub async fn send_to(&self, client: &Client, text: &str) -> bool {
        match client.send(text) {
            Ok(()) => true,
            Err(e) => {
                debug!(client_id = client.id, error = %e, "Send failed, dropping client");
                self.remove(client.id).await;
                false
            }
        }
    }

    /// Deliver to every registered client.
    ///
    /// Iterates over a snapshot of the set, so concurrent adds and removes
    /// never interleave with the fan-out. Returns the number of clients the
    /// frame was handed to.
    pub async fn broadcast(&self, data: impl Into<Outbound>) -> usize {
        let text = data.into().into_text();
        let frame = encode_text_frame(&text);

        let targets: Vec<Arc<Client>> = self.clients.read().await.values().cloned().collect();

        let mut failed = Vec::new();
        for client in &targets {
            if let Err(e) = client.send_encoded(frame.clone()) {
                debug!(client_id = client.id, error = %e, "Broadcast send failed");
                failed.push(client.id);
            }
        }

        if !failed.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &failed {
                clients.remove(id);
            }
            debug!(
                dropped = failed.len(),
                remaining = clients.len(),
                "Removed clients after failed broadcast"
            );
        }

        targets.len() - failed.len()
    }

    /// Serialize `value` as JSON and broadcast it.
    ///
    /// Serialization failures are logged and nothing is sent.
    pub async fn broadcast_json<T: Serialize + ?Sized>(&self, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(text) => self.broadcast(text).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast payload");
                0
            }
        }
    }
}
