//! # Echo Benchmark - Main Entry Point
//!
//! Measures throughput and message counts against a remote echo server.
//!
//! ```text
//! echo-benchmark                          # 1 connection, 64 bytes, 10s
//! echo-benchmark --num 100 --size 1024    # 100 connections of 1 KiB messages
//! echo-benchmark --num 400 --procs 4      # 4 processes of 100 connections each
//! echo-benchmark --addr 10.0.0.5:10010 --duration 20
//! ```
//!
//! ## Output Contract
//!
//! Stdout carries report lines only; all logging goes to stderr. A single
//! process prints one line:
//!
//! ```text
//! Send Count: <n>, Recv Count: <n>, Read Count: <n>, Write Count: <n>
//! ```
//!
//! With `--procs` above one, every child prints that line, and the parent
//! echoes each child's output followed by a separator and the grand total.
//!
//! ## Error Handling
//!
//! Setup failures (an unreachable server, a child that cannot be spawned)
//! end the process with an error. Failures during the run are logged and the
//! counts gathered so far are still reported.

use anyhow::{Context, Result};
use clap::Parser;
use echo_benchmark::{
    cli::{Args, BenchmarkConfig},
    coordinator::Coordinator,
    fanout::{self, FanOut},
    logging::init_logging,
    results::BenchmarkResults,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so the log file is flushed on exit.
    let _log_guard = init_logging(args.verbose, args.log_file.as_deref())?;

    info!("Starting Echo Benchmark v{}", echo_benchmark::VERSION);
    info!("Configuration: {:?}", args);

    let config = BenchmarkConfig::from_args(&args)?;

    let report = if config.is_fan_out() {
        let program =
            std::env::current_exe().context("Failed to get current executable path")?;
        let summary = FanOut::for_benchmark(&config, program).run().await?;
        print!("{}", summary);
        summary.total
    } else {
        if config.wait_for_release {
            fanout::wait_for_release_on_stdin().await?;
        }
        let report = Coordinator::new(config.clone()).run().await?;
        println!("{}", report);
        report
    };

    if args.reports_results() {
        let results = BenchmarkResults::new(&config, report);
        results.log_summary();
        if let Some(ref path) = args.output_file {
            results.write_json(path)?;
        }
    }

    info!("Echo Benchmark completed");
    Ok(())
}
