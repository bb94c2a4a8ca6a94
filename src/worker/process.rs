//! Subprocess lifecycle: spawn the tool, stream stderr to the progress
//! parser, and drive a guaranteed termination chain (signal, grace wait,
//! hard kill) on timeout or explicit cancellation.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::progress::{self, ProgressSample};

const GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Timeout,
    Cancelled,
}

pub async fn run_with_progress(
    tool_path: &str,
    args: &[String],
    total_duration_secs: Option<f64>,
    overall_timeout: Duration,
    mut cancel: watch::Receiver<bool>,
    mut on_progress: impl FnMut(ProgressSample) + Send + 'static,
) -> Result<ExitOutcome> {
    debug!(tool = tool_path, args = ?args, "spawning subprocess");

    let mut child = Command::new(tool_path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::tool_failure("failed to start media tool").with_source(e))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::internal("child stderr was not captured"))?;
    let mut lines = BufReader::new(stderr).lines();

    let stderr_task = tokio::spawn(async move {
        let mut last_sample = ProgressSample::default();
        while let Ok(Some(line)) = lines.next_line().await {
            let sample = progress::parse_line(&line, total_duration_secs);
            if !sample.is_empty() {
                last_sample = sample.clone();
                on_progress(sample);
            }
        }
        last_sample
    });

    let timeout_sleep = tokio::time::sleep(overall_timeout);
    tokio::pin!(timeout_sleep);

    let outcome = loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| Error::tool_failure("failed to wait on media tool").with_source(e))?;
                if status.success() {
                    break ExitOutcome::Success;
                }
                return Err(Error::tool_failure("media tool exited with a non-zero status"));
            }
            _ = &mut timeout_sleep => {
                warn!("job exceeded its wall-clock ceiling; terminating subprocess");
                terminate_with_grace(&mut child).await;
                break ExitOutcome::Timeout;
            }
            changed = cancel.changed() => {
                if changed.is_ok() && *cancel.borrow() {
                    warn!("job was cancelled; terminating subprocess");
                    terminate_with_grace(&mut child).await;
                    break ExitOutcome::Cancelled;
                }
            }
        }
    };

    let _ = stderr_task.await;

    Ok(outcome)
}

/// Signal → grace wait → hard kill. `start_kill` already sends SIGKILL on
/// unix via tokio, so the "signal" step here additionally tries a courteous
/// SIGTERM first on unix platforms to give the tool a chance to flush
/// output files; Windows has no equivalent and goes straight to kill.
async fn terminate_with_grace(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // Safety: pid is a valid, live child process id obtained from
            // the tokio::process::Child we still own.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    match tokio::time::timeout(GRACE_PERIOD, child.wait()).await {
        Ok(Ok(_)) => return,
        Ok(Err(err)) => warn!(error = %err, "error waiting on child after SIGTERM"),
        Err(_) => {}
    }

    if let Err(err) = child.start_kill() {
        warn!(error = %err, "failed to hard-kill subprocess");
        return;
    }
    let _ = child.wait().await;
}
