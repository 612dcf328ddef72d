//! # Process Fan-Out
//!
//! Scales a benchmark past one process by running P copies of the program
//! side by side and summing what they print.
//!
//! ## Protocol
//!
//! 1. **Spawn**: start P children with a proportional share of connections
//!    and the wait flag. Each child's stdout is captured, its stdin piped.
//! 2. **Release**: once all children exist, write one newline to each stdin
//!    in turn. Children are released one after another, not atomically.
//! 3. **Collect**: wait for every child. An abnormal exit is logged and does
//!    not stop collection of the others.
//! 4. **Aggregate**: parse the report line each child printed and sum them.
//!
//! A child that exits with an error still contributes whatever report it
//! printed; one that printed nothing contributes zero.

use crate::{cli::BenchmarkConfig, report::RunReport};
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

/// Printed between the child outputs and the grand total
pub const SEPARATOR: &str = "--------------------";

/// Spawns and aggregates a set of identical child runs
#[derive(Debug, Clone)]
pub struct FanOut {
    program: PathBuf,
    args: Vec<String>,
    processes: usize,
}

struct SpawnedChild {
    index: usize,
    child: Child,
    stdin: ChildStdin,
}

/// What one child left behind
#[derive(Debug, Clone)]
pub struct ChildOutcome {
    pub index: usize,
    /// `None` when the child could not be waited on
    pub status: Option<ExitStatus>,
    /// Everything the child wrote to stdout
    pub output: String,
    /// The parsed report line, if the output held one
    pub report: Option<RunReport>,
}

impl ChildOutcome {
    fn new(index: usize, status: Option<ExitStatus>, output: String) -> Self {
        let report = RunReport::find_in(&output);
        if report.is_none() {
            warn!(
                "Benchmark process {} produced no report line, counting it as zero",
                index
            );
        }
        Self {
            index,
            status,
            output,
            report,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.map_or(false, |s| s.success())
    }
}

/// All child outcomes plus their grand total
#[derive(Debug, Clone)]
pub struct FanOutSummary {
    pub children: Vec<ChildOutcome>,
    pub total: RunReport,
}

impl FanOutSummary {
    pub fn from_outcomes(children: Vec<ChildOutcome>) -> Self {
        let total = children.iter().filter_map(|c| c.report).sum();
        Self { children, total }
    }

    pub fn failed_children(&self) -> usize {
        self.children.iter().filter(|c| !c.succeeded()).count()
    }
}

impl fmt::Display for FanOutSummary {
    /// Each child's output verbatim, a separator, then the grand total line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for child in &self.children {
            f.write_str(&child.output)?;
            if !child.output.is_empty() && !child.output.ends_with('\n') {
                writeln!(f)?;
            }
        }
        writeln!(f, "{}", SEPARATOR)?;
        writeln!(f, "{}", self.total)
    }
}

impl FanOut {
    /// Run `program args...` in `processes` copies.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, processes: usize) -> Self {
        Self {
            program: program.into(),
            args,
            processes,
        }
    }

    /// Fan `config` out by re-invoking `program` (normally the current executable).
    pub fn for_benchmark(config: &BenchmarkConfig, program: impl Into<PathBuf>) -> Self {
        let unassigned = config.unassigned_connections();
        if unassigned > 0 {
            warn!(
                "{} connections do not divide evenly across {} processes; {} will not be opened",
                config.connections, config.processes, unassigned
            );
        }
        Self::new(program, config.child_args(), config.processes)
    }

    pub fn processes(&self) -> usize {
        self.processes
    }

    /// Spawn, release, collect, and aggregate.
    ///
    /// Failing to spawn a child or to obtain its stdin is fatal; children
    /// already started are killed when their handles drop.
    pub async fn run(&self) -> Result<FanOutSummary> {
        let children = self.spawn_all()?;
        info!("Spawned {} benchmark processes", children.len());

        let children = release_all(children).await;
        let outcomes = collect_all(children).await;

        let summary = FanOutSummary::from_outcomes(outcomes);
        let failed = summary.failed_children();
        if failed > 0 {
            warn!(
                "{} of {} benchmark processes exited abnormally; their reported counts are still included",
                failed, self.processes
            );
        }
        Ok(summary)
    }

    fn spawn_all(&self) -> Result<Vec<SpawnedChild>> {
        let mut children = Vec::with_capacity(self.processes);
        for index in 0..self.processes {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);

            debug!(
                "Spawning benchmark process {}: {} {}",
                index,
                self.program.display(),
                self.args.join(" ")
            );
            let mut child = cmd.spawn().with_context(|| {
                format!(
                    "Failed to spawn benchmark process {} ({})",
                    index,
                    self.program.display()
                )
            })?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("Failed to get stdin pipe of benchmark process {}", index))?;

            children.push(SpawnedChild {
                index,
                child,
                stdin,
            });
        }
        Ok(children)
    }
}

/// Write the release cue to every child, one after another.
async fn release_all(children: Vec<SpawnedChild>) -> Vec<(usize, Child)> {
    let mut released = Vec::with_capacity(children.len());
    for SpawnedChild {
        index,
        child,
        mut stdin,
    } in children
    {
        let write = async {
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            warn!("Failed to release benchmark process {}: {}", index, e);
        }
        drop(stdin);
        released.push((index, child));
    }
    debug!("Released {} benchmark processes", released.len());
    released
}

async fn collect_all(children: Vec<(usize, Child)>) -> Vec<ChildOutcome> {
    // Drain every child concurrently so no stdout pipe can fill up while
    // another child is being waited on.
    let waits: Vec<_> = children
        .into_iter()
        .map(|(index, child)| (index, tokio::spawn(child.wait_with_output())))
        .collect();

    let mut outcomes = Vec::with_capacity(waits.len());
    for (index, wait) in waits {
        let outcome = match wait.await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    warn!(
                        "Benchmark process {} exited abnormally: {}",
                        index, output.status
                    );
                }
                ChildOutcome::new(
                    index,
                    Some(output.status),
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                )
            }
            Ok(Err(e)) => {
                warn!("Waiting for benchmark process {} failed: {}", index, e);
                ChildOutcome::new(index, None, String::new())
            }
            Err(e) => {
                warn!("Waiting for benchmark process {} failed: {}", index, e);
                ChildOutcome::new(index, None, String::new())
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Block until one line (or end of input) arrives on `input`.
///
/// This is the child side of the release step.
pub async fn wait_for_release<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<()> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .await
        .context("Failed to read release cue")?;
    if read == 0 {
        debug!("Release cue input closed, starting anyway");
    } else {
        debug!("Release cue received");
    }
    Ok(())
}

/// [`wait_for_release`] on this process's stdin.
pub async fn wait_for_release_on_stdin() -> Result<()> {
    info!("Waiting for release cue on stdin");
    let mut stdin = BufReader::new(tokio::io::stdin());
    wait_for_release(&mut stdin).await
}
