//! End-to-end pipeline tests
//!
//! ffmpeg and ffprobe are replaced by small shell scripts, so these tests
//! run without real media tools or network access.
#![cfg(unix)]

use async_trait::async_trait;
use mediaverify::config::Config;
use mediaverify::error::{Result, VerifyError};
use mediaverify::moderate::{ContentClassifier, ContentType, ModerationRequest};
use mediaverify::pipeline::{VerificationJob, VerificationService};
use mediaverify::progress::{ProgressEvent, ProgressSink, Stage};
use mediaverify::transcribe::Transcriber;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Writes `<kind>@<-ss value>` into the output file (the last argument).
const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version fake"; exit 0; fi
prev=""
ss=""
for arg in "$@"; do
  if [ "$prev" = "-ss" ]; then ss="$arg"; fi
  prev="$arg"
  last="$arg"
done
case "$last" in
  *.wav) printf 'clip@%s' "$ss" > "$last" ;;
  *) printf 'frame@%s' "$ss" > "$last" ;;
esac
"#;

/// Fails every frame extraction.
const FAKE_FFMPEG_NO_FRAMES: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version fake"; exit 0; fi
for arg in "$@"; do last="$arg"; done
case "$last" in
  *.wav) printf 'clip' > "$last" ;;
  *) echo "Invalid data found when processing input" >&2; exit 1 ;;
esac
"#;

const FAKE_FFPROBE: &str = "#!/bin/sh\necho 200.0\n";

const BROKEN_FFPROBE: &str = "#!/bin/sh\necho N/A\n";

struct FakeTools {
    _dir: TempDir,
    ffmpeg: PathBuf,
    ffmpeg_no_frames: PathBuf,
    ffprobe: PathBuf,
    broken_ffprobe: PathBuf,
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Scripts are written once, before any test spawns a process.
fn tools() -> &'static FakeTools {
    static TOOLS: OnceLock<FakeTools> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        FakeTools {
            ffmpeg: write_script(dir.path(), "ffmpeg", FAKE_FFMPEG),
            ffmpeg_no_frames: write_script(dir.path(), "ffmpeg-no-frames", FAKE_FFMPEG_NO_FRAMES),
            ffprobe: write_script(dir.path(), "ffprobe", FAKE_FFPROBE),
            broken_ffprobe: write_script(dir.path(), "ffprobe-broken", BROKEN_FFPROBE),
            _dir: dir,
        }
    })
}

fn config(temp_root: &Path, ffmpeg: &Path, ffprobe: &Path) -> Config {
    Config {
        ffmpeg_path: ffmpeg.display().to_string(),
        ffprobe_path: ffprobe.display().to_string(),
        temp_root: Some(temp_root.to_path_buf()),
        tool_timeout_secs: 10,
        ..Default::default()
    }
}

fn recording_sink() -> (Arc<dyn ProgressSink>, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let store = events.clone();
    let sink: Arc<dyn ProgressSink> =
        Arc::new(move |event: ProgressEvent| store.lock().unwrap().push(event));
    (sink, events)
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

/// Echoes the clip contents back. Earlier clips answer later.
struct EchoTranscriber;

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, audio: &[u8], _mime_type: &str) -> Result<String> {
        let text = String::from_utf8_lossy(audio).to_string();
        let offset: f64 = text
            .split('@')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let delay = (200.0 - offset).max(0.0) as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "Echo"
    }
}

/// Records what it was asked and approves.
#[derive(Default)]
struct RecordingClassifier {
    seen: Mutex<Vec<(usize, Option<String>)>>,
}

#[async_trait]
impl ContentClassifier for RecordingClassifier {
    async fn classify(&self, request: &ModerationRequest) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((request.images().len(), request.transcript.clone()));
        Ok(r#"{"isApproved": true, "confidence": 0.9, "reason": "Choir performance", "flags": [], "requiresReview": false}"#.to_string())
    }

    fn name(&self) -> &'static str {
        "Recording"
    }
}

// ============================================================================
// Media Pipeline Tests
// ============================================================================

mod media_pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_video_verification_end_to_end() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let service = VerificationService::new(&config(root.path(), &tools.ffmpeg, &tools.ffprobe))
            .with_transcriber(Arc::new(EchoTranscriber));
        let (sink, events) = recording_sink();

        let job = VerificationJob::new("vid-1", ContentType::Videos, vec![0u8; 64], "video/mp4")
            .with_title("Sunday worship");
        let outcome = service
            .verify(job, sink, CancellationToken::new())
            .await
            .unwrap();

        // Sample order, not completion order.
        assert_eq!(
            outcome.transcript.as_deref(),
            Some("clip@0.000 clip@70.000 clip@140.000")
        );

        let frames = outcome.video_frames.as_ref().unwrap();
        let stamps: Vec<u64> = frames
            .iter()
            .map(|f| f.timestamp.as_secs_f64().round() as u64)
            .collect();
        assert_eq!(stamps, vec![10, 100, 190]);
        assert_eq!(frames[1].data, b"frame@100.000");

        assert!(outcome.is_approved);
        assert_eq!(outcome.stats.samples, 3);
        assert_eq!(outcome.stats.frames, 3);
        assert_eq!(outcome.stats.media_duration, Some(Duration::from_secs(200)));

        let events = events.lock().unwrap();
        let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![10, 20, 30, 50, 70, 75, 95]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.iter().all(|e| e.upload_id == "vid-1"));

        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_music_skips_frames() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let service = VerificationService::new(&config(root.path(), &tools.ffmpeg, &tools.ffprobe))
            .with_transcriber(Arc::new(EchoTranscriber));

        let job = VerificationJob::new("mus-1", ContentType::Music, vec![0u8; 64], "video/mp4");
        let outcome = service
            .verify(job, Arc::new(mediaverify::progress::NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.video_frames.is_none());
        assert_eq!(outcome.stats.frames, 0);
        assert_eq!(outcome.stats.samples, 3);
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_probe_failure_uses_audio_fallback() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let service =
            VerificationService::new(&config(root.path(), &tools.ffmpeg, &tools.broken_ffprobe))
                .with_transcriber(Arc::new(EchoTranscriber));

        let job = VerificationJob::new("aud-1", ContentType::Audio, vec![0u8; 64], "audio/mpeg");
        let outcome = service
            .verify(job, Arc::new(mediaverify::progress::NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.media_duration, Some(Duration::from_secs(60)));
        assert_eq!(outcome.transcript.as_deref(), Some("clip@0.000"));
    }

    #[tokio::test]
    async fn test_frame_failure_aborts_job() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let service = VerificationService::new(&config(
            root.path(),
            &tools.ffmpeg_no_frames,
            &tools.ffprobe,
        ));
        let (sink, events) = recording_sink();

        let job = VerificationJob::new("vid-2", ContentType::Videos, vec![0u8; 64], "video/mp4");
        let err = service
            .verify(job, sink, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.root(), VerifyError::Extraction(_)));
        assert!(err.to_string().contains("vid-2"));

        let events = events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Error);
        assert_eq!(last.progress, 0);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_cancellation_stops_job() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let service = VerificationService::new(&config(root.path(), &tools.ffmpeg, &tools.ffprobe))
            .with_transcriber(Arc::new(EchoTranscriber));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(move |event: ProgressEvent| {
            if event.stage == Stage::Transcribing {
                trigger.cancel();
            }
        });

        let job = VerificationJob::new("vid-3", ContentType::Videos, vec![0u8; 64], "video/mp4");
        let err = service.verify(job, sink, cancel).await.unwrap_err();

        assert!(matches!(err.root(), VerifyError::Cancelled));
        assert!(dir_is_empty(root.path()));
    }
}

// ============================================================================
// Media Tools Tests
// ============================================================================

mod media_tools_tests {
    use super::*;
    use mediaverify::media::{JobWorkspace, MediaTools};

    #[tokio::test]
    async fn test_tool_checks() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let media = MediaTools::from_config(&config(root.path(), &tools.ffmpeg, &tools.ffprobe));
        assert!(media.check_ffmpeg(&cancel).await.is_ok());
        assert!(media.check_ffprobe(&cancel).await.is_ok());

        let missing = MediaTools::from_config(&config(
            root.path(),
            Path::new("/nonexistent/ffmpeg"),
            Path::new("/nonexistent/ffprobe"),
        ));
        let err = missing.check_ffprobe(&cancel).await.unwrap_err();
        assert!(matches!(err, VerifyError::ToolUnavailable(_)));
    }

    #[tokio::test]
    async fn test_probe_duration_reads_tool_output() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let media = MediaTools::from_config(&config(root.path(), &tools.ffmpeg, &tools.ffprobe));

        let workspace = JobWorkspace::create(root.path(), "probe-1").unwrap();
        let duration = media
            .probe_duration(b"fake video", "video/mp4", &workspace, &cancel)
            .await;
        assert_eq!(duration, Duration::from_secs(200));

        // The staged copy is gone once probing returns.
        assert!(dir_is_empty(workspace.path()));
    }
}

// ============================================================================
// Moderation Integration Tests
// ============================================================================

mod moderation_tests {
    use super::*;

    #[tokio::test]
    async fn test_classifier_sees_transcript_and_frames() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let classifier = Arc::new(RecordingClassifier::default());
        let service = VerificationService::new(&config(root.path(), &tools.ffmpeg, &tools.ffprobe))
            .with_transcriber(Arc::new(EchoTranscriber))
            .with_classifier(classifier.clone());

        let job = VerificationJob::new("vid-4", ContentType::Videos, vec![0u8; 64], "video/mp4")
            .with_thumbnail(b"thumb".to_vec(), "image/png");
        let outcome = service
            .verify(job, Arc::new(mediaverify::progress::NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_approved);
        assert_eq!(outcome.moderation_result.reason(), "Choir performance");
        assert!(outcome.stats.classifier_used);

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        // Thumbnail plus two frames.
        assert_eq!(seen[0].0, 3);
        assert_eq!(
            seen[0].1.as_deref(),
            Some("clip@0.000 clip@70.000 clip@140.000")
        );
    }

    #[tokio::test]
    async fn test_denylisted_title_rejected_without_classifier() {
        let tools = tools();
        let root = tempfile::tempdir().unwrap();
        let service = VerificationService::new(&config(root.path(), &tools.ffmpeg, &tools.ffprobe));

        let job = VerificationJob::new("vid-5", ContentType::Videos, vec![0u8; 64], "video/mp4")
            .with_title("Gospel concert")
            .with_description("Contains graphic violence");
        let outcome = service
            .verify(job, Arc::new(mediaverify::progress::NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.is_approved);
        assert!(outcome.moderation_result.requires_review());
        assert!(outcome.moderation_result.flags().contains("denylist:violence"));
        // No transcriber configured.
        assert!(outcome.transcript.is_none());
    }

    #[tokio::test]
    async fn test_book_text_reaches_classifier() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = SimpleFileOptions::default();
            zip.start_file("mimetype", options).unwrap();
            zip.write_all(b"application/epub+zip").unwrap();
            zip.start_file("OEBPS/chapter1.xhtml", options).unwrap();
            zip.write_all(b"<html><body><p>In the beginning was the Word.</p></body></html>")
                .unwrap();
            zip.finish().unwrap();
        }

        let root = tempfile::tempdir().unwrap();
        let classifier = Arc::new(RecordingClassifier::default());
        let service = VerificationService::new(&config(
            root.path(),
            Path::new("/nonexistent/ffmpeg"),
            Path::new("/nonexistent/ffprobe"),
        ))
        .with_classifier(classifier.clone());

        let job = VerificationJob::new(
            "book-1",
            ContentType::Books,
            buf.into_inner(),
            "application/epub+zip",
        );
        let outcome = service
            .verify(job, Arc::new(mediaverify::progress::NoopSink), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_approved);
        assert!(outcome.transcript.is_none());

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some("In the beginning was the Word."));
    }
}
