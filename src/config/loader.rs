//! YAML config file loading

use std::fs;
use std::path::Path;

use crate::error::AppError;

use super::types::ServerConfig;

/// Read, parse and validate a YAML config file.
pub fn load_config(path: &Path) -> Result<ServerConfig, AppError> {
    let yaml = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    load_config_from_str(&yaml)
}

/// Keys left out of `yaml` keep their [`ServerConfig::default`] values.
pub fn load_config_from_str(yaml: &str) -> Result<ServerConfig, AppError> {
    let config: ServerConfig =
        serde_yaml::from_str(yaml).map_err(|e| AppError::Config(format!("invalid YAML: {}", e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document() {
        let config = load_config_from_str(
            "bind_addr: 127.0.0.1:8080\n\
             broadcast_interval_ms: 1000\n\
             max_request_head_bytes: 32768\n\
             health_path: /health\n\
             header_read_timeout_ms: 2000\n",
        )
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.broadcast_interval_ms, 1000);
        assert_eq!(config.max_request_head_bytes, 32768);
        assert_eq!(config.health_path, "/health");
        assert_eq!(config.header_read_timeout_ms, 2000);
    }

    #[test]
    fn test_omitted_keys_take_defaults() {
        let config = load_config_from_str("broadcast_interval_ms: 2500\n").unwrap();
        assert_eq!(
            config,
            ServerConfig {
                broadcast_interval_ms: 2500,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_bad_yaml_and_bad_values() {
        let err = load_config_from_str("bind_addr: [unterminated").unwrap_err();
        assert!(err.to_string().contains("invalid YAML"), "Got: {}", err);

        let err = load_config_from_str("broadcast_interval_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("broadcast_interval_ms must be > 0"), "Got: {}", err);
    }

    #[test]
    fn test_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.yaml");
        fs::write(&path, "health_path: /status\n").unwrap();

        assert_eq!(load_config(&path).unwrap().health_path, "/status");
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = load_config(Path::new("/nonexistent/dashboard.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dashboard.yaml"), "Got: {}", err);
    }
}
