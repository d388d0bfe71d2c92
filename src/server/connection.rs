//! Promotion of an upgraded byte stream to a tracked client
//!
//! Each client gets a writer task fed through a bounded queue, so sends never
//! block the caller, and a reader task that discards incoming bytes and
//! watches for close or error.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{AppError, HandshakeError};

use super::handshake::{derive_accept_key, switching_protocols_response, UpgradeRequest};
use super::registry::{Client, ClientId, ClientRegistry};

/// First message every client receives
pub const WELCOME_MESSAGE: &str =
    r#"{"type":"connected","message":"WebSocket connection established"}"#;

/// Frames a client may have waiting before it is treated as gone
pub const CLIENT_QUEUE_FRAMES: usize = 64;

const READ_BUF_LEN: usize = 1024;

/// Complete the handshake on a raw `stream` and register the new client.
///
/// On a handshake error nothing is written and the stream is dropped,
/// which closes the connection.
pub async fn accept<S>(
    registry: &ClientRegistry,
    request: &UpgradeRequest,
    mut stream: S,
    peer: Option<SocketAddr>,
) -> Result<ClientId, AppError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    if !request.is_websocket_upgrade() {
        return Err(HandshakeError::NotUpgrade.into());
    }
    let key = request.websocket_key()?;
    let response = switching_protocols_response(&derive_accept_key(key));
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    register(registry, stream, peer).await
}

/// Track a stream whose `101` response has already been sent.
pub async fn register<S>(
    registry: &ClientRegistry,
    stream: S,
    peer: Option<SocketAddr>,
) -> Result<ClientId, AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(CLIENT_QUEUE_FRAMES);

    let id = registry.allocate_id();
    let client = Arc::new(Client::new(id, peer, Box::new(frame_tx)));

    // Queued ahead of registration so no broadcast can overtake it.
    client.send(WELCOME_MESSAGE)?;

    // Registered before either task runs, so a close seen by the reader
    // always finds the client to remove.
    registry.add(client).await;
    tokio::spawn(write_loop(registry.clone(), id, writer, frame_rx));
    tokio::spawn(read_loop(registry.clone(), id, reader));

    let clients = registry.client_count().await;
    info!(client_id = id, peer = ?peer, clients, "WebSocket client connected");

    Ok(id)
}

async fn write_loop<W>(
    registry: ClientRegistry,
    id: ClientId,
    mut writer: WriteHalf<W>,
    mut frame_rx: mpsc::Receiver<Bytes>,
) where
    W: AsyncWrite,
{
    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!(client_id = id, error = %e, "Write failed");
            disconnect(&registry, id, "write error").await;
            return;
        }
    }

    // Every sender is gone: the client already left the registry.
    if let Err(e) = writer.shutdown().await {
        debug!(client_id = id, error = %e, "Shutdown after removal failed");
    }
}

async fn read_loop<R>(registry: ClientRegistry, id: ClientId, mut reader: ReadHalf<R>)
where
    R: AsyncRead,
{
    let mut buf = [0u8; READ_BUF_LEN];
    let reason = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break "closed",
            // Client frames are not interpreted.
            Ok(_) => continue,
            Err(e) => {
                debug!(client_id = id, error = %e, "Read failed");
                break "read error";
            }
        }
    };

    disconnect(&registry, id, reason).await;
}

async fn disconnect(registry: &ClientRegistry, id: ClientId, reason: &str) {
    if registry.remove(id).await {
        let clients = registry.client_count().await;
        info!(client_id = id, reason, clients, "WebSocket client disconnected");
    }
}
