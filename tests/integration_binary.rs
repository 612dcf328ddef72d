use anyhow::Result;
use echo_benchmark::{fanout::SEPARATOR, RunReport};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_echo-benchmark");

async fn spawn_echo_server() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    Ok(addr)
}

async fn run_binary(args: &[&str]) -> Result<(bool, String)> {
    let output = Command::new(BIN)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await?;
    Ok((output.status.success(), String::from_utf8(output.stdout)?))
}

/// A single-process run prints exactly one report line on stdout.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_process_prints_one_report_line() -> Result<()> {
    let addr = spawn_echo_server().await?;
    let (ok, stdout) = run_binary(&[
        "--addr", &addr, "--num", "2", "--size", "32", "--duration", "500ms",
    ])
    .await?;

    assert!(ok);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "unexpected stdout: {:?}", stdout);
    let report: RunReport = lines[0].parse()?;
    assert!(report.send_count > 0);
    assert!(report.recv_count <= report.send_count);
    Ok(())
}

/// Two processes each print a line; the parent adds a separator and the total.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fan_out_prints_children_and_total() -> Result<()> {
    let addr = spawn_echo_server().await?;
    let (ok, stdout) = run_binary(&[
        "--addr", &addr, "--num", "4", "--procs", "2", "--size", "16", "--duration", "500ms",
    ])
    .await?;

    assert!(ok);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4, "unexpected stdout: {:?}", stdout);
    assert_eq!(lines[2], SEPARATOR);

    let children: Vec<RunReport> = lines[..2]
        .iter()
        .map(|l| l.parse())
        .collect::<Result<_, _>>()?;
    let total: RunReport = lines[3].parse()?;
    assert_eq!(total, children.iter().sum::<RunReport>());
    assert!(children.iter().all(|c| c.send_count > 0));
    Ok(())
}

/// A top-level `--wait` run still writes the results file it was asked for.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_run_writes_output_file() -> Result<()> {
    let addr = spawn_echo_server().await?;
    let dir = tempfile::tempdir()?;
    let results_path = dir.path().join("results.json");
    let results_arg = results_path.to_string_lossy().into_owned();

    let mut child = Command::new(BIN)
        .args([
            "--addr",
            addr.as_str(),
            "--duration",
            "300ms",
            "--wait",
            "--output-file",
            results_arg.as_str(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(b"\n").await?;
    }
    let output = child.wait_with_output().await?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let printed: RunReport = stdout.trim_end().parse()?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&results_path)?)?;
    let written: RunReport = serde_json::from_value(json["report"].clone())?;
    assert_eq!(written, printed);
    Ok(())
}

/// Nothing listening: the run fails instead of printing a report.
#[tokio::test]
async fn unreachable_server_exits_with_error() -> Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?.to_string();
    drop(listener);

    let (ok, stdout) = run_binary(&["--addr", &addr, "--duration", "200ms"]).await?;
    assert!(!ok);
    assert!(stdout.is_empty());
    Ok(())
}
