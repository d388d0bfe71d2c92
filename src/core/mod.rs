//! Core module - snapshot sources and clock helpers

pub mod telemetry;
pub mod time;

pub use telemetry::{ServerStatus, SnapshotSource, StatusSource};
pub use time::current_time_ms;
