//! Snapshot sources for the periodic broadcast
//!
//! A [`SnapshotSource`] produces the `data` field of every `update` message.
//! Plain closures returning a `Serialize` value work out of the box; sources
//! that need I/O or can fail implement the trait directly.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::server::ClientRegistry;

/// Produces one JSON snapshot per broadcast tick.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn snapshot(&self) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, T> SnapshotSource for F
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Serialize + Send,
{
    async fn snapshot(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self())?)
    }
}

/// Server status pushed by the stock binary
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub uptime_secs: f64,
    pub connected_clients: usize,
    pub version: &'static str,
}

/// Reports uptime and connection count of a running server.
pub struct StatusSource {
    started: Instant,
    registry: ClientRegistry,
}

impl StatusSource {
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            started: Instant::now(),
            registry,
        }
    }

    pub async fn status(&self) -> ServerStatus {
        ServerStatus {
            uptime_secs: self.started.elapsed().as_secs_f64(),
            connected_clients: self.registry.client_count().await,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[async_trait]
impl SnapshotSource for StatusSource {
    async fn snapshot(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self.status().await)?)
    }
}
