//! Dashboard WebSocket push server
//!
//! Real-time updates for the miner dashboard:
//! - RFC 6455 opening handshake and unmasked text-frame encoding
//! - Client registry with per-client fault isolation
//! - Periodic snapshot broadcast while clients are connected
//! - axum/hyper HTTP front end with a health endpoint

pub mod config;
pub mod core;
pub mod error;
pub mod server;

pub use error::AppError;
pub use server::WebSocketServer;
