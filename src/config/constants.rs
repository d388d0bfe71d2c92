//! Application-wide constants and configuration defaults
//!
//! Values can be overridden via environment variables.

// =============================================================================
// Defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default snapshot broadcast period (5 seconds)
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 5_000;

/// Default limit on an HTTP request head
pub const DEFAULT_MAX_REQUEST_HEAD_BYTES: usize = 16 * 1024;

/// Default time a client gets to finish sending its request head
pub const DEFAULT_HEADER_READ_TIMEOUT_MS: u64 = 10_000;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

// =============================================================================
// Environment Overrides
// =============================================================================

/// Configuration file path (default: `config.yaml`)
///
/// Environment variable: `DASHBOARD_CONFIG`
pub fn config_path() -> String {
    std::env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Listen address override
///
/// Environment variable: `WS_BIND_ADDR`
pub fn bind_addr_override() -> Option<String> {
    std::env::var("WS_BIND_ADDR")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Broadcast period override in milliseconds
///
/// Environment variable: `WS_BROADCAST_INTERVAL_MS`
pub fn broadcast_interval_ms_override() -> Option<u64> {
    std::env::var("WS_BROADCAST_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
}

/// Request head limit override
///
/// Environment variable: `WS_MAX_REQUEST_HEAD_BYTES`
pub fn max_request_head_bytes_override() -> Option<usize> {
    std::env::var("WS_MAX_REQUEST_HEAD_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(env)]
    fn test_unset_overrides_are_none() {
        std::env::remove_var("WS_BIND_ADDR");
        std::env::remove_var("WS_BROADCAST_INTERVAL_MS");
        assert!(bind_addr_override().is_none());
        assert!(broadcast_interval_ms_override().is_none());
    }

    #[test]
    #[serial(env)]
    fn test_unparseable_override_is_ignored() {
        std::env::set_var("WS_MAX_REQUEST_HEAD_BYTES", "lots");
        assert!(max_request_head_bytes_override().is_none());
        std::env::remove_var("WS_MAX_REQUEST_HEAD_BYTES");
    }

    #[test]
    #[serial(env)]
    fn test_config_path_default() {
        std::env::remove_var("DASHBOARD_CONFIG");
        assert_eq!(config_path(), "config.yaml");
    }
}
