//! Timed execution of external commands (`git`, `kubectl`).

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

/// Why a command produced no exit status.
#[derive(Debug)]
pub(crate) enum RunError {
    Spawn(std::io::Error),
    TimedOut(Duration),
}

/// Runs `cmd` to completion, capturing stdout and stderr.
///
/// The child is killed when `timeout` elapses first.
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
) -> std::result::Result<Output, RunError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(RunError::Spawn)?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(RunError::Spawn),
        Err(_) => Err(RunError::TimedOut(timeout)),
    }
}

/// Formats a failed command's output with both stderr and stdout.
pub(crate) fn format_command_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}
