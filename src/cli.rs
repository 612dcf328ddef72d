use crate::utils::{
    validate_connections, validate_duration, validate_message_size, validate_processes,
};
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Echo Benchmark - throughput and message counts against an echo-style TCP service
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Echo server address
    #[clap(short = 'a', long, default_value = crate::defaults::SERVER_ADDR, help_heading = "Core Options")]
    pub addr: String,

    /// Total number of client connections (split evenly across processes)
    #[clap(short = 'n', long = "num", default_value_t = crate::defaults::CONNECTIONS, help_heading = "Core Options")]
    pub connections: usize,

    /// Message payload size in bytes
    #[clap(short = 's', long = "size", default_value_t = crate::defaults::MESSAGE_SIZE, help_heading = "Core Options")]
    pub message_size: usize,

    /// How long to run (e.g. 10, 10s, 500ms, 1m)
    #[clap(short = 'd', long, alias = "time", value_parser = parse_duration, default_value = "10s", help_heading = "Core Options")]
    pub duration: Duration,

    /// Number of benchmark processes to fan the connections out across
    #[clap(short = 'p', long = "procs", default_value_t = crate::defaults::PROCESSES)]
    pub processes: usize,

    /// Block until a line arrives on stdin before starting (set on child processes)
    #[clap(long, default_value_t = false, hide = true)]
    pub wait: bool,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            addr: crate::defaults::SERVER_ADDR.to_string(),
            connections: crate::defaults::CONNECTIONS,
            message_size: crate::defaults::MESSAGE_SIZE,
            duration: crate::defaults::DURATION,
            processes: crate::defaults::PROCESSES,
            wait: false,
            output_file: None,
            log_file: None,
            verbose: false,
        }
    }
}

impl Args {
    /// Whether this invocation logs the run summary and writes results.
    ///
    /// Fan-out children (`--wait` without an output file) only print their
    /// report line; a top-level `--wait` run with `--output-file` still writes.
    pub fn reports_results(&self) -> bool {
        !self.wait || self.output_file.is_some()
    }
}

/// Validated run parameters
///
/// Built once at startup and read-only afterwards. A child process gets its
/// own copy rebuilt from the arguments produced by [`BenchmarkConfig::child_args`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub server_addr: String,
    /// Connections in this invocation; with fan-out, the total across children
    pub connections: usize,
    pub message_size: usize,
    pub duration: Duration,
    pub processes: usize,
    pub wait_for_release: bool,
    pub dial_timeout: Duration,
    pub verbose: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            server_addr: crate::defaults::SERVER_ADDR.to_string(),
            connections: crate::defaults::CONNECTIONS,
            message_size: crate::defaults::MESSAGE_SIZE,
            duration: crate::defaults::DURATION,
            processes: crate::defaults::PROCESSES,
            wait_for_release: false,
            dial_timeout: crate::defaults::DIAL_TIMEOUT,
            verbose: false,
        }
    }
}

impl BenchmarkConfig {
    /// Convert parsed arguments into a checked configuration.
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            server_addr: args.addr.clone(),
            connections: args.connections,
            message_size: args.message_size,
            duration: args.duration,
            processes: args.processes,
            wait_for_release: args.wait,
            dial_timeout: crate::defaults::DIAL_TIMEOUT,
            verbose: args.verbose,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_addr.trim().is_empty() {
            anyhow::bail!("Server address cannot be empty");
        }
        validate_connections(self.connections)?;
        validate_message_size(self.message_size)?;
        validate_duration(self.duration)?;
        validate_processes(self.processes)?;
        if self.connections < self.processes {
            anyhow::bail!(
                "Cannot split {} connections across {} processes",
                self.connections,
                self.processes
            );
        }
        Ok(())
    }

    pub fn is_fan_out(&self) -> bool {
        self.processes > 1
    }

    /// Connections each child runs. Any remainder is not assigned.
    pub fn connections_per_process(&self) -> usize {
        self.connections / self.processes
    }

    pub fn unassigned_connections(&self) -> usize {
        self.connections % self.processes
    }

    /// Arguments for one child: the same run with a proportional share of
    /// connections, a single process, and the wait flag set.
    pub fn child_args(&self) -> Vec<String> {
        let mut args = vec![
            "--addr".to_string(),
            self.server_addr.clone(),
            "--num".to_string(),
            self.connections_per_process().to_string(),
            "--size".to_string(),
            self.message_size.to_string(),
            "--duration".to_string(),
            format!("{}ns", self.duration.as_nanos()),
            "--procs".to_string(),
            "1".to_string(),
            "--wait".to_string(),
        ];
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

/// Parse duration from string (e.g., "10s", "5m", "1h", "500ms", "250us", "100ns")
///
/// A bare number is taken as seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ns") {
        (stripped, "ns")
    } else if let Some(stripped) = s.strip_suffix("us") {
        (stripped, "us")
    } else if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let factor_ns = match unit {
        "ns" => 1.0,
        "us" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => 1_000_000_000.0,
        "m" => 60_000_000_000.0,
        "h" => 3_600_000_000_000.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };
    let duration = Duration::from_nanos((num * factor_ns).round() as u64);

    Ok(duration)
}
