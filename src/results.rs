use crate::{cli::BenchmarkConfig, report::RunReport, utils};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Complete results of one top-level benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResults {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub test_config: TestConfiguration,
    pub report: RunReport,
    pub throughput: ThroughputSummary,
    pub system_info: SystemInfo,
}

/// Test configuration used for the benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub server_addr: String,
    pub connections: usize,
    pub processes: usize,
    pub message_size: usize,
    pub duration: Duration,
}

/// Rates derived from the report over the configured run duration
///
/// Byte rates count payload bytes only, not the length prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputSummary {
    pub sends_per_second: f64,
    pub receives_per_second: f64,
    pub send_bytes_per_second: f64,
    pub receive_bytes_per_second: f64,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub benchmark_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: utils::get_cpu_cores(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

impl ThroughputSummary {
    pub fn from_report(report: &RunReport, message_size: usize, duration: Duration) -> Self {
        let sends = u64::from(report.send_count);
        let receives = u64::from(report.recv_count);
        let size = message_size as u64;
        Self {
            sends_per_second: utils::per_second(sends, duration),
            receives_per_second: utils::per_second(receives, duration),
            send_bytes_per_second: utils::per_second(sends * size, duration),
            receive_bytes_per_second: utils::per_second(receives * size, duration),
        }
    }
}

impl BenchmarkResults {
    /// Create results for a finished run
    pub fn new(config: &BenchmarkConfig, report: RunReport) -> Self {
        Self {
            run_id: utils::generate_run_id(),
            timestamp: chrono::Utc::now(),
            test_config: TestConfiguration {
                server_addr: config.server_addr.clone(),
                connections: config.connections,
                processes: config.processes,
                message_size: config.message_size,
                duration: config.duration,
            },
            throughput: ThroughputSummary::from_report(
                &report,
                config.message_size,
                config.duration,
            ),
            report,
            system_info: SystemInfo::default(),
        }
    }

    /// Log a human-readable summary of the run
    pub fn log_summary(&self) {
        info!(
            "Send: {} ({}), Recv: {} ({})",
            utils::format_message_rate(self.throughput.sends_per_second),
            utils::format_rate(self.throughput.send_bytes_per_second),
            utils::format_message_rate(self.throughput.receives_per_second),
            utils::format_rate(self.throughput.receive_bytes_per_second),
        );
    }

    /// Write the results as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to {:?}", path))?;
        info!("Results written to: {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_config() -> BenchmarkConfig {
        BenchmarkConfig {
            connections: 4,
            processes: 2,
            message_size: 100,
            duration: Duration::from_secs(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_benchmark_results_creation() {
        let report = RunReport::new(2000, 1800, 4000, 2100);
        let results = BenchmarkResults::new(&sample_config(), report);

        assert_eq!(results.report, report);
        assert_eq!(results.test_config.connections, 4);
        assert_eq!(results.test_config.processes, 2);
        assert_eq!(results.throughput.sends_per_second, 1000.0);
        assert_eq!(results.throughput.receives_per_second, 900.0);
        assert_eq!(results.throughput.send_bytes_per_second, 100_000.0);
        assert!(!results.run_id.is_empty());
    }

    #[test]
    fn test_results_written_as_json() {
        let temp_file = NamedTempFile::new().unwrap();
        let results = BenchmarkResults::new(&sample_config(), RunReport::new(1, 2, 3, 4));
        results.write_json(temp_file.path()).unwrap();

        let text = std::fs::read_to_string(temp_file.path()).unwrap();
        let parsed: BenchmarkResults = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.report, RunReport::new(1, 2, 3, 4));
        assert_eq!(parsed.run_id, results.run_id);
        assert_eq!(parsed.test_config.message_size, 100);
    }

    #[test]
    fn test_system_info_default() {
        let info = SystemInfo::default();

        assert!(!info.os.is_empty());
        assert!(!info.architecture.is_empty());
        assert!(info.cpu_cores > 0);
        assert_eq!(info.benchmark_version, crate::VERSION);
    }
}
