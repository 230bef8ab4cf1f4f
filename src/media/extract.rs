use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, VerifyError};

use super::command::stderr_tail;
use super::{Frame, JobWorkspace, MediaTools, Sample, SampleWindow, ScratchFile};

impl MediaTools {
    /// Extract one WAV clip per window, all at once.
    ///
    /// Any failed clip fails the whole extraction. Samples come back in
    /// window order, not completion order.
    pub async fn extract_audio_samples(
        &self,
        input: &Path,
        windows: &[SampleWindow],
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>> {
        if !input.exists() {
            return Err(VerifyError::FileNotFound(input.display().to_string()));
        }

        info!("Extracting {} audio samples", windows.len());

        let jobs = windows.iter().enumerate().map(|(index, window)| async move {
            let data = self
                .extract_audio_segment(input, *window, workspace, cancel)
                .await?;
            debug!(
                "Sample {} extracted ({} bytes at {:.1}s)",
                index,
                data.len(),
                window.offset.as_secs_f64()
            );
            Ok::<_, VerifyError>(Sample {
                index,
                offset: window.offset,
                duration: window.duration,
                data,
            })
        });

        try_join_all(jobs).await
    }

    /// Extract one downscaled JPEG per timestamp, all at once.
    pub async fn extract_frames(
        &self,
        input: &Path,
        timestamps: &[Duration],
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
    ) -> Result<Vec<Frame>> {
        if !input.exists() {
            return Err(VerifyError::FileNotFound(input.display().to_string()));
        }

        info!("Extracting {} frames", timestamps.len());

        let jobs = timestamps.iter().enumerate().map(|(index, timestamp)| async move {
            let data = self
                .extract_frame(input, *timestamp, workspace, cancel)
                .await?;
            debug!(
                "Frame {} extracted ({} bytes at {:.1}s)",
                index,
                data.len(),
                timestamp.as_secs_f64()
            );
            Ok::<_, VerifyError>(Frame {
                index,
                timestamp: *timestamp,
                data,
            })
        });

        try_join_all(jobs).await
    }

    async fn extract_audio_segment(
        &self,
        input: &Path,
        window: SampleWindow,
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if window.duration.is_zero() {
            return Err(VerifyError::Extraction(
                "Segment duration is zero".to_string(),
            ));
        }

        let output = ScratchFile::new(workspace.scratch_path("sample", "wav"));
        let args = audio_segment_args(input, window, output.path());

        self.run_ffmpeg(args, "audio segment", cancel).await?;
        read_output(output).await
    }

    async fn extract_frame(
        &self,
        input: &Path,
        timestamp: Duration,
        workspace: &JobWorkspace,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let output = ScratchFile::new(workspace.scratch_path("frame", "jpg"));
        let args = frame_args(
            input,
            timestamp,
            self.frame_width,
            self.frame_quality,
            output.path(),
        );

        self.run_ffmpeg(args, "frame", cancel).await?;
        read_output(output).await
    }

    async fn run_ffmpeg(
        &self,
        args: Vec<OsString>,
        what: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let output = self.runner.run(&self.ffmpeg, args, cancel).await?;

        if !output.status.success() {
            return Err(VerifyError::Extraction(format!(
                "FFmpeg {} extraction failed ({}): {}",
                what,
                output.status,
                stderr_tail(&output)
            )));
        }

        Ok(())
    }
}

async fn read_output(output: ScratchFile) -> Result<Vec<u8>> {
    if !output.path().exists() {
        return Err(VerifyError::Extraction(
            "Output file was not created".to_string(),
        ));
    }

    let data = output.consume().await?;
    if data.is_empty() {
        return Err(VerifyError::Extraction("Output file is empty".to_string()));
    }

    Ok(data)
}

fn audio_segment_args(input: &Path, window: SampleWindow, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", window.offset.as_secs_f64()).into(),
        "-t".into(),
        format!("{:.3}", window.duration.as_secs_f64()).into(),
        "-i".into(),
    ];
    args.push(input.as_os_str().to_owned());
    args.extend(
        ["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

fn frame_args(
    input: &Path,
    timestamp: Duration,
    width: u32,
    quality: u8,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", timestamp.as_secs_f64()).into(),
        "-i".into(),
    ];
    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={width}:-2"),
            "-q:v".to_string(),
            quality.to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_audio_segment_args() {
        let window = SampleWindow {
            offset: Duration::from_secs(70),
            duration: Duration::from_secs(60),
        };
        let args = strings(&audio_segment_args(
            Path::new("/tmp/in.mp4"),
            window,
            Path::new("/tmp/out.wav"),
        ));

        assert_eq!(&args[..6], ["-y", "-ss", "70.000", "-t", "60.000", "-i"]);
        assert_eq!(args[6], "/tmp/in.mp4");
        assert!(args.contains(&"pcm_s16le".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.wav");
    }

    #[test]
    fn test_frame_args() {
        let args = strings(&frame_args(
            Path::new("/tmp/in.mp4"),
            Duration::from_millis(10_500),
            320,
            5,
            Path::new("/tmp/out.jpg"),
        ));

        assert_eq!(&args[..3], ["-y", "-ss", "10.500"]);
        assert!(args.contains(&"scale=320:-2".to_string()));
        let q = args.iter().position(|a| a == "-q:v").unwrap();
        assert_eq!(args[q + 1], "5");
        assert_eq!(args.last().unwrap(), "/tmp/out.jpg");
    }

    #[tokio::test]
    async fn test_extract_missing_input() {
        let tools = MediaTools::from_config(&Config::default());
        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path(), "missing").unwrap();

        let result = tools
            .extract_frames(
                Path::new("/nonexistent/input.mp4"),
                &[Duration::from_secs(1)],
                &workspace,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(VerifyError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_extract_fails_without_ffmpeg() {
        let config = Config {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..Default::default()
        };
        let tools = MediaTools::from_config(&config);
        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path(), "noffmpeg").unwrap();
        let input = workspace.write_scratch("input", "mp4", b"data").await.unwrap();

        let windows = [SampleWindow {
            offset: Duration::ZERO,
            duration: Duration::from_secs(10),
        }];
        let result = tools
            .extract_audio_samples(input.path(), &windows, &workspace, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(VerifyError::ToolUnavailable(_))));
        drop(input);
        assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
    }
}
