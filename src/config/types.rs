//! Configuration types for the dashboard server
//!
//! Loaded from YAML, then layered with environment overrides from
//! [`super::constants`].

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::constants;

/// Smallest read buffer the HTTP/1 connection accepts.
pub const MIN_REQUEST_HEAD_BYTES: usize = 8 * 1024;

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:3000")
    pub bind_addr: String,
    /// Period of the snapshot broadcast in milliseconds
    pub broadcast_interval_ms: u64,
    /// Upper bound on the size of an HTTP request head
    pub max_request_head_bytes: usize,
    /// Route answered with the JSON health document
    pub health_path: String,
    /// Deadline for a client to finish sending its request head
    pub header_read_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: constants::DEFAULT_BIND_ADDR.to_string(),
            broadcast_interval_ms: constants::DEFAULT_BROADCAST_INTERVAL_MS,
            max_request_head_bytes: constants::DEFAULT_MAX_REQUEST_HEAD_BYTES,
            health_path: "/api/health".to_string(),
            header_read_timeout_ms: constants::DEFAULT_HEADER_READ_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Validate configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(AppError::Config(format!(
                "bind_addr must be a socket address like 0.0.0.0:3000 (got '{}')",
                self.bind_addr
            )));
        }

        if self.broadcast_interval_ms == 0 {
            return Err(AppError::Config(
                "broadcast_interval_ms must be > 0".to_string(),
            ));
        }

        if self.max_request_head_bytes < MIN_REQUEST_HEAD_BYTES {
            return Err(AppError::Config(format!(
                "max_request_head_bytes must be >= {} (got {})",
                MIN_REQUEST_HEAD_BYTES, self.max_request_head_bytes
            )));
        }

        if !self.health_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "health_path must start with '/' (got '{}')",
                self.health_path
            )));
        }

        // Route patterns would capture instead of matching literally.
        if self.health_path.contains(['{', '}', '*', ':']) {
            return Err(AppError::Config(format!(
                "health_path must be a literal path (got '{}')",
                self.health_path
            )));
        }

        if self.header_read_timeout_ms == 0 {
            return Err(AppError::Config(
                "header_read_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Overlay values from the environment on top of the loaded file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(addr) = constants::bind_addr_override() {
            self.bind_addr = addr;
        }
        if let Some(ms) = constants::broadcast_interval_ms_override() {
            self.broadcast_interval_ms = ms;
        }
        if let Some(bytes) = constants::max_request_head_bytes_override() {
            self.max_request_head_bytes = bytes;
        }
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_millis(self.header_read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast_interval(), Duration::from_secs(5));
        assert_eq!(config.health_path, "/api/health");
        assert_eq!(config.header_read_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = ServerConfig {
            broadcast_interval_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broadcast_interval_ms"));
    }

    #[test]
    fn test_rejects_bad_bind_addr() {
        let config = ServerConfig {
            bind_addr: "localhost".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bind_addr"));
    }

    #[test]
    fn test_rejects_tiny_head_limit() {
        let config = ServerConfig {
            max_request_head_bytes: 64,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_relative_health_path() {
        let config = ServerConfig {
            health_path: "health".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_health_path_pattern() {
        for path in ["/api/{id}", "/api/*rest", "/api/:id"] {
            let config = ServerConfig {
                health_path: path.to_string(),
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("literal"), "{}: {}", path, err);
        }
    }

    #[test]
    fn test_rejects_zero_header_timeout() {
        let config = ServerConfig {
            header_read_timeout_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("header_read_timeout_ms"));
    }

    #[test]
    #[serial(env)]
    fn test_env_overrides_file_values() {
        std::env::set_var("WS_BROADCAST_INTERVAL_MS", "250");
        std::env::set_var("WS_BIND_ADDR", "127.0.0.1:9000");

        let mut config = ServerConfig::default();
        config.apply_env_overrides();

        std::env::remove_var("WS_BROADCAST_INTERVAL_MS");
        std::env::remove_var("WS_BIND_ADDR");

        assert_eq!(config.broadcast_interval_ms, 250);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(
            config.max_request_head_bytes,
            constants::DEFAULT_MAX_REQUEST_HEAD_BYTES
        );
    }
}
