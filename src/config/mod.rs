//! Configuration module for server settings and YAML loading
//!
//! This module provides:
//! - Configuration types (`ServerConfig`)
//! - YAML loading functionality (`load_config`)
//! - Defaults with environment variable overrides
//! - Logging setup (`init_logging`)

pub mod constants;
pub mod logging;
mod loader;
mod types;

pub use types::{ServerConfig, MIN_REQUEST_HEAD_BYTES};

pub use loader::{load_config, load_config_from_str};

pub use logging::{init_logging, LogFormat};
