//! # Echo Benchmark Library
//!
//! A throughput benchmark for echo-style TCP services. It opens many
//! concurrent connections, drives a synchronized send/receive loop on each
//! for a fixed duration, and sums the per-connection counters into a single
//! report. The same workload can be fanned out across several OS processes
//! and their printed reports merged into one grand total.
//!
//! ## Architecture Overview
//!
//! Control flows from the top down, counters flow back up:
//!
//! - `fanout`: spawns child processes, releases them, parses and sums their reports
//! - `coordinator`: one process, N connections, one start barrier, one report
//! - `worker`: one connection, a send loop and a receive loop
//! - `framing` / `counted`: length-prefixed messages over a counted byte stream
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use echo_benchmark::{BenchmarkConfig, Coordinator};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BenchmarkConfig {
//!         server_addr: "127.0.0.1:10010".to_string(),
//!         connections: 100,
//!         message_size: 64,
//!         duration: Duration::from_secs(10),
//!         ..Default::default()
//!     };
//!
//!     let report = Coordinator::new(config).run().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

/// Command-line interface and validated run configuration
///
/// Argument parsing uses clap; `BenchmarkConfig` is the checked form the
/// rest of the crate consumes, including the argument vector handed to
/// child processes.
pub mod cli;

/// Benchmark Coordinator: one local run across N connections
pub mod coordinator;

/// Raw read/write call counting for a connection
pub mod counted;

/// Process fan-out: spawn, release, collect, and sum child runs
pub mod fanout;

/// Length-prefixed message framing
pub mod framing;

/// Start barrier shared by the coordinator and all loops
pub mod gate;

/// Tracing subscriber setup and the level-colored console formatter
pub mod logging;

/// The four-counter run report and its one-line text encoding
pub mod report;

/// Optional JSON results file written by the top-level process
pub mod results;

/// Validation and human-readable formatting helpers
pub mod utils;

/// Client Worker: send and receive loops over one connection
pub mod worker;

pub use cli::{Args, BenchmarkConfig};
pub use coordinator::Coordinator;
pub use fanout::{FanOut, FanOutSummary};
pub use report::RunReport;
pub use results::BenchmarkResults;

/// The current version of the echo benchmark
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default echo server address
    pub const SERVER_ADDR: &str = "127.0.0.1:10010";

    /// Default number of connections
    pub const CONNECTIONS: usize = 1;

    /// Default message payload size in bytes
    pub const MESSAGE_SIZE: usize = 64;

    /// Default run duration
    pub const DURATION: Duration = Duration::from_secs(10);

    /// Default number of benchmark processes
    pub const PROCESSES: usize = 1;

    /// How long a single connection attempt may take before the run aborts
    pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);

    /// How long loops get to unwind after their connections are shut down
    pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

    /// Upper bound on connections per run
    pub const MAX_CONNECTIONS: usize = 65_536;

    /// Upper bound on fan-out processes
    pub const MAX_PROCESSES: usize = 1024;
}
