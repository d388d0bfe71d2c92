//! Wall-clock helpers

/// Milliseconds since the Unix epoch.
///
/// A clock set before 1970 reads as 0 rather than failing.
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
