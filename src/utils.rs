//! # Utility Functions and Helper Module
//!
//! Small helpers shared across the echo benchmark: human-readable formatters
//! for the run summary, validation of run parameters with clear error
//! messages, and a little system information for the results file.
//!
//! ## Usage Examples
//!
//! ```rust
//! use echo_benchmark::utils::*;
//!
//! // Format throughput rates
//! let rate_str = format_rate(1048576.0);
//! assert_eq!(rate_str, "1.00 MB/s");
//!
//! // Validate configuration parameters
//! # fn main() -> anyhow::Result<()> {
//! validate_message_size(1024)?; // OK
//! # Ok(())
//! # }
//! ```

use crate::defaults::{MAX_CONNECTIONS, MAX_PROCESSES};
use crate::framing::MAX_FRAME_LEN;
use anyhow::Result;
use std::time::Duration;
use uuid::Uuid;

/// Generate a unique identifier for a benchmark run
///
/// Creates a UUID v4 string used to tag the results file, so runs launched
/// side by side against the same server can be told apart afterwards.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format bytes in a human-readable way
///
/// ## Examples
///
/// ```rust
/// # use echo_benchmark::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(2621440), "2.50 MB");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    format_bytes_f64(bytes as f64)
}

/// Format bytes (as f64) in a human-readable way
///
/// Values are formatted with 2 decimal places for scaled units. Binary
/// scaling (powers of 1024) is used throughout.
pub fn format_bytes_f64(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a rate (bytes per second) in a human-readable way
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_second))
}

/// Format a message rate in a human-readable way
///
/// Uses decimal scaling (powers of 1000) for rate measurements:
/// - Messages/sec: < 1,000 (e.g., "750 msg/s")
/// - Thousands: < 1,000,000 (e.g., "15.50K msg/s")
/// - Millions: ≥ 1,000,000 (e.g., "2.30M msg/s")
///
/// ## Examples
///
/// ```rust
/// # use echo_benchmark::utils::format_message_rate;
/// assert_eq!(format_message_rate(750.0), "750 msg/s");
/// assert_eq!(format_message_rate(15500.0), "15.50K msg/s");
/// assert_eq!(format_message_rate(2300000.0), "2.30M msg/s");
/// ```
pub fn format_message_rate(messages_per_second: f64) -> String {
    if messages_per_second < 1000.0 {
        format!("{:.0} msg/s", messages_per_second)
    } else if messages_per_second < 1_000_000.0 {
        format!("{:.2}K msg/s", messages_per_second / 1000.0)
    } else {
        format!("{:.2}M msg/s", messages_per_second / 1_000_000.0)
    }
}

/// Per-second rate of `count` events over `duration`, or zero for an empty window.
pub fn per_second(count: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Validate that a message size fits in one frame
///
/// ## Validation Rules
///
/// - **Minimum**: 1 byte
/// - **Maximum**: 65,535 bytes, the largest payload a 2-byte length prefix
///   can describe. Larger payloads would have to be truncated on the wire.
pub fn validate_message_size(message_size: usize) -> Result<()> {
    if message_size == 0 {
        anyhow::bail!("Message size cannot be zero");
    }
    if message_size > MAX_FRAME_LEN {
        anyhow::bail!(
            "Message size {} is too large (maximum {} bytes for a 2-byte length prefix)",
            message_size,
            MAX_FRAME_LEN
        );
    }
    Ok(())
}

/// Validate the total number of connections
///
/// Every connection runs two loops that join the start barrier, so the
/// upper bound also keeps the barrier count well inside its limits.
pub fn validate_connections(connections: usize) -> Result<()> {
    if connections == 0 {
        anyhow::bail!("Connection count cannot be zero");
    }
    if connections > MAX_CONNECTIONS {
        anyhow::bail!(
            "Connection count {} is too high (maximum {})",
            connections,
            MAX_CONNECTIONS
        );
    }
    Ok(())
}

/// Validate the number of benchmark processes
pub fn validate_processes(processes: usize) -> Result<()> {
    if processes == 0 {
        anyhow::bail!("Process count cannot be zero");
    }
    if processes > MAX_PROCESSES {
        anyhow::bail!(
            "Process count {} is too high (maximum {})",
            processes,
            MAX_PROCESSES
        );
    }
    Ok(())
}

/// Validate the run duration
pub fn validate_duration(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        anyhow::bail!("Run duration cannot be zero");
    }
    Ok(())
}

/// Get the number of CPU cores available
///
/// Uses the `num_cpus` crate, which accounts for container limits and
/// process affinity. Reported in the results file for reproducibility.
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test byte formatting with various scales
    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1572864), "1.50 MB");
        assert_eq!(format_bytes(1610612736), "1.50 GB");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(1024.0), "1.00 KB/s");
        assert_eq!(format_rate(1048576.0), "1.00 MB/s");
    }

    #[test]
    fn test_format_message_rate() {
        assert_eq!(format_message_rate(500.0), "500 msg/s");
        assert_eq!(format_message_rate(1500.0), "1.50K msg/s");
        assert_eq!(format_message_rate(1500000.0), "1.50M msg/s");
    }

    #[test]
    fn test_per_second() {
        assert_eq!(per_second(1000, Duration::from_secs(2)), 500.0);
        assert_eq!(per_second(10, Duration::from_millis(500)), 20.0);
        assert_eq!(per_second(10, Duration::ZERO), 0.0);
    }

    /// Message sizes are bounded by what the length prefix can carry
    #[test]
    fn test_validate_message_size() {
        assert!(validate_message_size(1).is_ok());
        assert!(validate_message_size(1024).is_ok());
        assert!(validate_message_size(65535).is_ok());
        assert!(validate_message_size(0).is_err());
        assert!(validate_message_size(65536).is_err());
    }

    #[test]
    fn test_validate_connections() {
        assert!(validate_connections(1).is_ok());
        assert!(validate_connections(MAX_CONNECTIONS).is_ok());
        assert!(validate_connections(0).is_err());
        assert!(validate_connections(MAX_CONNECTIONS + 1).is_err());
    }

    #[test]
    fn test_validate_processes() {
        assert!(validate_processes(1).is_ok());
        assert!(validate_processes(8).is_ok());
        assert!(validate_processes(0).is_err());
        assert!(validate_processes(MAX_PROCESSES + 1).is_err());
    }

    #[test]
    fn test_validate_duration() {
        assert!(validate_duration(Duration::from_millis(1)).is_ok());
        assert!(validate_duration(Duration::ZERO).is_err());
    }

    #[test]
    fn test_get_cpu_cores() {
        assert!(get_cpu_cores() > 0);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }
}
