use crate::config::Config;
use crate::document::{extract_text, MODERATION_TEXT_LIMIT};
use crate::error::{Result, VerifyError};
use crate::gemini::GeminiClient;
use crate::media::{
    plan_audio_samples, plan_frame_timestamps, Frame, JobWorkspace, MediaKind, MediaTools,
};
use crate::moderate::{
    ContentClassifier, ContentType, GeminiClassifier, ImageInput, ModerationRequest,
    ModerationVerdict, Moderator,
};
use crate::progress::{checkpoint, ProgressReporter, ProgressSink, Stage};
use crate::transcribe::{create_transcriber, Transcriber, TranscriptionOrchestrator};
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One verification request. Lives for the duration of a single call.
#[derive(Debug, Clone)]
pub struct VerificationJob {
    pub upload_id: String,
    pub content_type: ContentType,
    pub title: String,
    pub description: String,
    pub file: Arc<[u8]>,
    pub mime_type: String,
    pub thumbnail: Option<ImageInput>,
}

impl VerificationJob {
    pub fn new(
        upload_id: impl Into<String>,
        content_type: ContentType,
        file: impl Into<Arc<[u8]>>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            content_type,
            title: String::new(),
            description: String::new(),
            file: file.into(),
            mime_type: mime_type.into(),
            thumbnail: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_thumbnail(mut self, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.thumbnail = Some(ImageInput {
            mime_type: mime_type.into(),
            data,
        });
        self
    }
}

/// Timing and sampling figures for one job.
#[derive(Debug, Clone, Default)]
pub struct VerificationStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub transcription_time: Duration,
    pub moderation_time: Duration,
    pub media_duration: Option<Duration>,
    pub samples: usize,
    pub frames: usize,
    pub failed_transcriptions: usize,
    pub classifier_used: bool,
}

/// What the caller gets back from a completed verification.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub is_approved: bool,
    pub moderation_result: ModerationVerdict,
    pub transcript: Option<String>,
    pub video_frames: Option<Vec<Frame>>,
    pub stats: VerificationStats,
}

/// Best-effort side effect run after a verdict exists.
///
/// Failures are logged and never change the outcome.
#[async_trait]
pub trait PostVerifyHook: Send + Sync {
    fn name(&self) -> &str;

    async fn after_verify(&self, job: &VerificationJob, outcome: &VerificationOutcome) -> Result<()>;
}

/// The verification pipeline. Build once, share across requests.
pub struct VerificationService {
    tools: MediaTools,
    temp_root: PathBuf,
    frame_count: usize,
    concurrency: usize,
    transcriber: Option<Arc<dyn Transcriber>>,
    moderator: Moderator,
    hooks: Vec<Arc<dyn PostVerifyHook>>,
}

impl VerificationService {
    /// A service with no transcriber and no classifier.
    pub fn new(config: &Config) -> Self {
        Self {
            tools: MediaTools::from_config(config),
            temp_root: config.temp_root(),
            frame_count: config.frame_count,
            concurrency: config.concurrency,
            transcriber: None,
            moderator: Moderator::default(),
            hooks: Vec::new(),
        }
    }

    /// A service wired to the adapters the configured keys allow.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut service = Self::new(config);

        if config.transcription_key().is_some() {
            let transcriber = create_transcriber(config.transcription_provider, config)?;
            info!("Transcription provider: {}", transcriber.name());
            service.transcriber = Some(Arc::from(transcriber));
        } else {
            warn!(
                "No API key for {} transcription; audio will not be transcribed",
                config.transcription_provider
            );
        }

        if let Some(ref key) = config.gemini_api_key {
            let client = GeminiClient::new(key.clone()).with_model(config.gemini_model.clone());
            service.moderator = Moderator::new(Some(Arc::new(GeminiClassifier::with_client(client))));
        } else {
            warn!("GEMINI_API_KEY not set; moderation will use keyword heuristics");
        }

        Ok(service)
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.moderator = Moderator::new(Some(classifier));
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostVerifyHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Verify one upload.
    ///
    /// Emits progress to `sink` and ends with exactly one terminal event:
    /// 95% on success, 0% with stage `error` on failure. All temporary files
    /// are gone when this returns.
    pub async fn verify(
        &self,
        job: VerificationJob,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<VerificationOutcome> {
        let start = Instant::now();
        let mut reporter = ProgressReporter::new(job.upload_id.clone(), sink);
        reporter.report(checkpoint::RECEIVED, Stage::Received, "File received");

        info!(
            "Verifying upload {} ({}, {}, {} bytes)",
            job.upload_id,
            job.content_type,
            job.mime_type,
            job.file.len()
        );

        match self.run(&job, &mut reporter, &cancel).await {
            Ok(mut outcome) => {
                outcome.stats.total_time = start.elapsed();
                reporter.finish(if outcome.is_approved {
                    "Content approved"
                } else if outcome.moderation_result.requires_review() {
                    "Content held for review"
                } else {
                    "Content rejected"
                });
                info!(
                    "Upload {} verified in {:.2}s: approved={} review={}",
                    job.upload_id,
                    outcome.stats.total_time.as_secs_f64(),
                    outcome.is_approved,
                    outcome.moderation_result.requires_review()
                );
                self.run_hooks(&job, &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                let e = e.for_job(&job.upload_id);
                warn!("{}", e);
                reporter.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &VerificationJob,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome> {
        reporter.report(checkpoint::VALIDATING, Stage::Validating, "Validating upload");

        if job.file.is_empty() {
            return Err(VerifyError::InvalidInput("Upload is empty".to_string()));
        }
        ensure_active(cancel)?;

        match job.content_type {
            ContentType::Books => self.verify_document(job, reporter, cancel).await,
            ContentType::Videos | ContentType::Music | ContentType::Audio => {
                self.verify_media(job, reporter, cancel).await
            }
        }
    }

    async fn verify_media(
        &self,
        job: &VerificationJob,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome> {
        let kind = MediaKind::from_mime(&job.mime_type).ok_or_else(|| {
            VerifyError::InvalidInput(format!(
                "Expected audio or video for {}, got {}",
                job.content_type, job.mime_type
            ))
        })?;
        let with_frames =
            job.content_type == ContentType::Videos && kind == MediaKind::Video && self.frame_count > 0;

        self.tools.check_ffmpeg(cancel).await?;

        let workspace = JobWorkspace::create(&self.temp_root, &job.upload_id)?;
        let input = workspace
            .write_scratch("input", MediaKind::extension_for(&job.mime_type), &job.file)
            .await?;

        reporter.report(checkpoint::ANALYZING, Stage::Analyzing, "Analyzing media");
        let mut stats = VerificationStats::default();
        let extraction_start = Instant::now();

        let duration = self.tools.probe_file(input.path(), kind, cancel).await;
        ensure_active(cancel)?;
        stats.media_duration = Some(duration);

        let windows = plan_audio_samples(duration);
        let timestamps = if with_frames {
            plan_frame_timestamps(duration, self.frame_count)
        } else {
            Vec::new()
        };
        debug!(
            "Planned {} audio samples and {} frames for {:.1}s of media",
            windows.len(),
            timestamps.len(),
            duration.as_secs_f64()
        );

        let audio = self
            .tools
            .extract_audio_samples(input.path(), &windows, &workspace, cancel);
        let frames = async {
            if with_frames {
                self.tools
                    .extract_frames(input.path(), &timestamps, &workspace, cancel)
                    .await
            } else {
                Ok(Vec::new())
            }
        };
        let (samples, frames) = tokio::try_join!(audio, frames)?;
        drop(input);

        stats.extraction_time = extraction_start.elapsed();
        stats.samples = samples.len();
        stats.frames = frames.len();

        reporter.report(
            checkpoint::TRANSCRIBING,
            Stage::Transcribing,
            format!("Transcribing {} audio samples", samples.len()),
        );
        let transcription_start = Instant::now();

        let transcript = match self.transcriber {
            Some(ref transcriber) => {
                let orchestrator =
                    TranscriptionOrchestrator::new(transcriber.clone(), self.concurrency);
                let (text, transcription_stats) =
                    until_cancelled(cancel, orchestrator.transcribe_samples(&samples)).await?;
                stats.failed_transcriptions = transcription_stats.failed_samples;
                text
            }
            None => {
                warn!("No transcriber configured, moderating without a transcript");
                String::new()
            }
        };
        drop(samples);
        stats.transcription_time = transcription_start.elapsed();

        reporter.report(
            checkpoint::TRANSCRIBED,
            Stage::Transcribing,
            "Transcription complete",
        );

        let mut request =
            ModerationRequest::new(job.content_type, job.title.clone(), job.description.clone());
        request.transcript = non_empty(&transcript);
        request.frames = frames.iter().map(ImageInput::from).collect();
        request.thumbnail = job.thumbnail.clone();

        let verdict = self.moderate(&request, reporter, &mut stats, cancel).await?;

        Ok(VerificationOutcome {
            is_approved: verdict.is_approved(),
            moderation_result: verdict,
            transcript: non_empty(&transcript),
            video_frames: with_frames.then_some(frames),
            stats,
        })
    }

    async fn verify_document(
        &self,
        job: &VerificationJob,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome> {
        reporter.report(
            checkpoint::ANALYZING,
            Stage::Analyzing,
            "Extracting document text",
        );
        let mut stats = VerificationStats::default();
        let extraction_start = Instant::now();

        let bytes = job.file.clone();
        let mime = job.mime_type.clone();
        let extraction = tokio::task::spawn_blocking(move || {
            extract_text(&bytes, &mime, MODERATION_TEXT_LIMIT)
        });
        let text = until_cancelled(cancel, extraction)
            .await?
            .unwrap_or_else(|e| {
                warn!("Text extraction task failed: {}", e);
                String::new()
            });
        stats.extraction_time = extraction_start.elapsed();

        if text.is_empty() {
            info!("No document text available, moderating on title and description");
        }

        let mut request =
            ModerationRequest::new(job.content_type, job.title.clone(), job.description.clone());
        request.transcript = non_empty(&text);
        request.thumbnail = job.thumbnail.clone();

        let verdict = self.moderate(&request, reporter, &mut stats, cancel).await?;

        Ok(VerificationOutcome {
            is_approved: verdict.is_approved(),
            moderation_result: verdict,
            transcript: None,
            video_frames: None,
            stats,
        })
    }

    async fn moderate(
        &self,
        request: &ModerationRequest,
        reporter: &mut ProgressReporter,
        stats: &mut VerificationStats,
        cancel: &CancellationToken,
    ) -> Result<ModerationVerdict> {
        reporter.report(checkpoint::MODERATING, Stage::Moderating, "Checking content");
        let start = Instant::now();

        let verdict = until_cancelled(cancel, self.moderator.moderate(request)).await?;

        stats.moderation_time = start.elapsed();
        stats.classifier_used = self.moderator.has_classifier();
        Ok(verdict)
    }

    async fn run_hooks(&self, job: &VerificationJob, outcome: &VerificationOutcome) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_verify(job, outcome).await {
                warn!("Post-verification hook '{}' failed: {}", hook.name(), e);
            }
        }
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(VerifyError::Cancelled)
    } else {
        Ok(())
    }
}

/// Drive `future` unless the job is cancelled first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VerifyError::Cancelled),
        output = future => Ok(output),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
