use std::ffi::OsStr;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, VerifyError};

/// Runs external tools with a timeout and cancellation.
///
/// The child is spawned with `kill_on_drop`, so losing the race against the
/// timer or the token terminates it.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` to completion and capture its output.
    ///
    /// A non-zero exit status is not an error here; callers decide what a
    /// failed run means for them.
    pub async fn run<I, S>(
        &self,
        program: &str,
        args: I,
        cancel: &CancellationToken,
    ) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", command.as_std());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} cancelled", program);
                return Err(VerifyError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, command.output()) => result,
        };

        match result {
            Err(_) => Err(VerifyError::Timeout {
                tool: program.to_string(),
                timeout: self.timeout,
            }),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => Err(VerifyError::ToolUnavailable(
                format!("{program} not found. Install FFmpeg and ensure it's in your PATH"),
            )),
            Ok(Err(e)) => Err(VerifyError::Io(e)),
            Ok(Ok(output)) => Ok(output),
        }
    }
}

/// Last non-empty stderr line, for error messages.
pub fn stderr_tail(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
