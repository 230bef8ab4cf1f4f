use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, VerifyError};

use super::command::stderr_tail;
use super::{JobWorkspace, MediaKind, MediaTools};

impl MediaTools {
    /// Check that ffmpeg is installed and runs.
    pub async fn check_ffmpeg(&self, cancel: &CancellationToken) -> Result<()> {
        self.check_tool(&self.ffmpeg, cancel).await
    }

    /// Check that ffprobe is installed and runs.
    pub async fn check_ffprobe(&self, cancel: &CancellationToken) -> Result<()> {
        self.check_tool(&self.ffprobe, cancel).await
    }

    async fn check_tool(&self, program: &str, cancel: &CancellationToken) -> Result<()> {
        let output = match self.runner.run(program, ["-version"], cancel).await {
            Ok(output) => output,
            Err(VerifyError::Io(e)) => {
                return Err(VerifyError::ToolUnavailable(format!(
                    "{program} could not be executed: {e}"
                )))
            }
            Err(e) => return Err(e),
        };

        if !output.status.success() {
            return Err(VerifyError::ToolUnavailable(format!(
                "{program} -version failed: {}",
                stderr_tail(&output)
            )));
        }

        debug!("{} is available", program);
        Ok(())
    }

    /// Probe the duration of an in-memory upload.
    ///
    /// The buffer is copied to a scratch file that is removed before this
    /// returns. Probing is advisory: every failure yields the fallback
    /// duration for the media kind.
    pub async fn probe_duration(
        &self,
        data: &[u8],
        mime: &str,
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
    ) -> Duration {
        let kind = MediaKind::from_mime(mime).unwrap_or(MediaKind::Video);

        let file = match workspace
            .write_scratch("probe", MediaKind::extension_for(mime), data)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                warn!("Could not stage file for probing: {}", e);
                return kind.fallback_duration();
            }
        };

        self.probe_file(file.path(), kind, cancel).await
    }

    /// Probe the duration of a file already on disk.
    pub async fn probe_file(
        &self,
        path: &Path,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Duration {
        match self.read_duration(path, cancel).await {
            Ok(duration) => {
                debug!("Probed duration: {:.2}s", duration.as_secs_f64());
                duration
            }
            Err(e) => {
                let fallback = kind.fallback_duration();
                warn!(
                    "Duration probe failed ({}), assuming {}s",
                    e,
                    fallback.as_secs()
                );
                fallback
            }
        }
    }

    async fn read_duration(&self, path: &Path, cancel: &CancellationToken) -> Result<Duration> {
        let mut args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
        ];
        args.push(path.as_os_str().to_owned());

        let output = self
            .runner
            .run(&self.ffprobe, args, cancel)
            .await?;

        if !output.status.success() {
            return Err(VerifyError::Extraction(format!(
                "ffprobe failed: {}",
                stderr_tail(&output)
            )));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's bare `format=duration` output.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let secs: f64 = trimmed.parse().map_err(|e| {
        VerifyError::Extraction(format!("Failed to parse duration '{}': {e}", trimmed))
    })?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(VerifyError::Extraction(format!(
            "Invalid duration '{}'",
            trimmed
        )));
    }

    Duration::try_from_secs_f64(secs).map_err(|e| {
        VerifyError::Extraction(format!("Invalid duration '{}': {e}", trimmed))
    })
}
