//! Application-wide error types using thiserror
//!
//! Library code returns `AppError`; the binary wraps it in `anyhow`.

use thiserror::Error;

/// Reasons an HTTP upgrade request is refused.
///
/// Every variant is fatal to the connection that produced it and harmless
/// to the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("invalid Sec-WebSocket-Key: {0}")]
    InvalidKey(String),

    #[error("request is not a websocket upgrade")]
    NotUpgrade,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
