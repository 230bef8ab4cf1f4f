use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mediaverify::config::{Config, Provider};
use mediaverify::document::{extract_text, DocumentFormat, GENERAL_TEXT_LIMIT};
use mediaverify::media::{plan_audio_samples, plan_frame_timestamps, MediaKind, DEFAULT_FRAME_COUNT};
use mediaverify::moderate::{ContentType, ModerationVerdict};
use mediaverify::pipeline::{
    PostVerifyHook, VerificationJob, VerificationOutcome, VerificationService,
};
use mediaverify::progress::{ProgressEvent, ProgressSink, Stage};
use mediaverify::transcribe::WhisperModel;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediaverify")]
#[command(version, about = "Sample and moderate uploaded media")]
#[command(long_about = "Probe, sample, transcribe and moderate video, audio and book uploads using ffmpeg with OpenAI Whisper or Google Gemini.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Transcription overrides layered on top of the loaded config.
#[derive(Args, Debug, Default)]
struct TranscriptionArgs {
    /// Transcription provider: whisper, gemini
    #[arg(short, long)]
    provider: Option<String>,

    /// OpenAI model: whisper-1, gpt-4o-transcribe, gpt-4o-mini-transcribe
    #[arg(long)]
    whisper_model: Option<String>,

    /// Spoken language hint (ISO 639-1, e.g. en, yo)
    #[arg(short, long)]
    language: Option<String>,
}

impl TranscriptionArgs {
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(provider) = self.provider {
            config.transcription_provider = provider
                .parse::<Provider>()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        if let Some(model) = self.whisper_model {
            config.whisper_model = model
                .parse::<WhisperModel>()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        if self.language.is_some() {
            config.language = self.language;
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the full verification pipeline on a file
    Verify {
        /// Input video, audio, PDF or EPUB file
        input: PathBuf,

        /// Content type: videos, music, audio, books (guessed from the file if omitted)
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,

        /// Upload title
        #[arg(long, default_value = "")]
        title: String,

        /// Upload description
        #[arg(long, default_value = "")]
        description: String,

        /// Thumbnail image sent to the classifier
        #[arg(long)]
        thumbnail: Option<PathBuf>,

        #[command(flatten)]
        transcription: TranscriptionArgs,

        /// Write a JSON report of the outcome to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Print the outcome as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Upload identifier used in progress events and temp directories
        #[arg(long)]
        upload_id: Option<String>,
    },

    /// Show the sampling plan for a given duration
    Plan {
        /// Media duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Number of frames to sample
        #[arg(short, long, default_value_t = DEFAULT_FRAME_COUNT)]
        frames: usize,
    },

    /// Print the text extracted from a PDF or EPUB
    Text {
        input: PathBuf,

        /// Maximum number of characters
        #[arg(short, long, default_value_t = GENERAL_TEXT_LIMIT)]
        limit: usize,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "mediaverify=debug" } else { "mediaverify=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// MIME type from the file extension.
fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn guess_content_type(mime: &str) -> Option<ContentType> {
    if DocumentFormat::from_mime(mime).is_some() {
        return Some(ContentType::Books);
    }
    match MediaKind::from_mime(mime)? {
        MediaKind::Video => Some(ContentType::Videos),
        MediaKind::Audio => Some(ContentType::Audio),
    }
}

/// Renders progress events as a terminal progress bar.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn report(&self, event: ProgressEvent) {
        match event.stage {
            Stage::Finalizing => {
                self.bar.set_position(event.progress as u64);
                self.bar.finish_with_message(format!("✓ {}", event.message));
            }
            Stage::Error => self.bar.abandon_with_message(format!("✗ {}", event.message)),
            _ => {
                self.bar.set_position(event.progress as u64);
                self.bar.set_message(event.message);
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    upload_id: &'a str,
    content_type: ContentType,
    is_approved: bool,
    moderation_result: &'a ModerationVerdict,
    transcript: Option<&'a str>,
    frame_timestamps: Option<Vec<f64>>,
    media_duration: Option<f64>,
    total_seconds: f64,
}

impl<'a> Report<'a> {
    fn new(upload_id: &'a str, content_type: ContentType, outcome: &'a VerificationOutcome) -> Self {
        Self {
            upload_id,
            content_type,
            is_approved: outcome.is_approved,
            moderation_result: &outcome.moderation_result,
            transcript: outcome.transcript.as_deref(),
            frame_timestamps: outcome
                .video_frames
                .as_ref()
                .map(|frames| frames.iter().map(|f| f.timestamp.as_secs_f64()).collect()),
            media_duration: outcome.stats.media_duration.map(|d| d.as_secs_f64()),
            total_seconds: outcome.stats.total_time.as_secs_f64(),
        }
    }
}

/// Writes the outcome to a JSON file once verification completes.
struct JsonReportHook {
    path: PathBuf,
}

#[async_trait]
impl PostVerifyHook for JsonReportHook {
    fn name(&self) -> &str {
        "json-report"
    }

    async fn after_verify(
        &self,
        job: &VerificationJob,
        outcome: &VerificationOutcome,
    ) -> mediaverify::Result<()> {
        let report = Report::new(&job.upload_id, job.content_type, outcome);
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(&self.path, json).await?;
        info!("Report written to {}", self.path.display());
        Ok(())
    }
}

fn print_summary(job_title: &str, outcome: &VerificationOutcome) {
    let verdict = &outcome.moderation_result;
    let status = if verdict.is_approved() {
        "APPROVED"
    } else if verdict.requires_review() {
        "NEEDS REVIEW"
    } else {
        "REJECTED"
    };

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Verification Complete                     ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    if !job_title.is_empty() {
        println!("  Title:      {}", job_title);
    }
    println!("  Verdict:    {}", status);
    println!("  Confidence: {:.2}", verdict.confidence());
    println!("  Review:     {}", if verdict.requires_review() { "yes" } else { "no" });
    println!("  Reason:     {}", verdict.reason());
    if !verdict.flags().is_empty() {
        let flags: Vec<&str> = verdict.flags().iter().map(String::as_str).collect();
        println!("  Flags:      {}", flags.join(", "));
    }
    if let Some(duration) = outcome.stats.media_duration {
        println!("  Duration:   {:.1}s media", duration.as_secs_f64());
    }
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s ({} samples, {} frames)",
        outcome.stats.extraction_time.as_secs_f64(),
        outcome.stats.samples,
        outcome.stats.frames
    );
    println!(
        "    Transcribe:  {:.2}s ({} failed)",
        outcome.stats.transcription_time.as_secs_f64(),
        outcome.stats.failed_transcriptions
    );
    println!(
        "    Moderate:    {:.2}s ({})",
        outcome.stats.moderation_time.as_secs_f64(),
        if outcome.stats.classifier_used { "classifier" } else { "keywords" }
    );
    println!(
        "    Total:       {:.2}s",
        outcome.stats.total_time.as_secs_f64()
    );
    if let Some(ref transcript) = outcome.transcript {
        println!();
        println!("  Transcript: {}", transcript);
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[allow(clippy::too_many_arguments)]
async fn run_verify(
    input: PathBuf,
    content_type: Option<String>,
    title: String,
    description: String,
    thumbnail: Option<PathBuf>,
    transcription: TranscriptionArgs,
    report: Option<PathBuf>,
    upload_id: Option<String>,
    json: bool,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    transcription.apply(&mut config)?;

    let mime = guess_mime(&input);
    let content_type = match content_type {
        Some(ct) => ct.parse::<ContentType>().map_err(|e| anyhow::anyhow!(e))?,
        None => guess_content_type(mime)
            .with_context(|| format!("Cannot infer content type for {}, pass --type", mime))?,
    };

    let data = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let upload_id = upload_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut job = VerificationJob::new(upload_id, content_type, data, mime)
        .with_title(title)
        .with_description(description);

    if let Some(path) = thumbnail {
        let image = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read thumbnail {}", path.display()))?;
        job = job.with_thumbnail(image, guess_mime(&path));
    }

    info!("Input:    {}", input.display());
    info!("Type:     {} ({})", content_type, mime);
    info!("Provider: {}", config.transcription_provider);

    let mut service =
        VerificationService::from_config(&config).context("Configuration validation failed")?;
    if let Some(path) = report {
        service = service.with_hook(Arc::new(JsonReportHook { path }));
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let title = job.title.clone();
    let upload_id = job.upload_id.clone();
    let outcome = service
        .verify(job, Arc::new(BarSink::new()), cancel)
        .await
        .context("Verification failed")?;

    if json {
        let report = Report::new(&upload_id, content_type, &outcome);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&title, &outcome);
    }
    Ok(())
}

fn run_plan(duration: f64, frames: usize) -> Result<()> {
    if !duration.is_finite() || duration < 0.0 {
        anyhow::bail!("Duration must be a non-negative number of seconds");
    }
    let total = Duration::try_from_secs_f64(duration)
        .with_context(|| format!("Duration {} is out of range", duration))?;

    println!("Audio samples for {:.1}s:", duration);
    for (i, window) in plan_audio_samples(total).iter().enumerate() {
        println!(
            "  {}: {:>8.1}s - {:>8.1}s",
            i,
            window.offset.as_secs_f64(),
            window.end().as_secs_f64()
        );
    }

    println!("Frame timestamps:");
    for (i, ts) in plan_frame_timestamps(total, frames).iter().enumerate() {
        println!("  {}: {:>8.1}s", i, ts.as_secs_f64());
    }
    Ok(())
}

async fn run_text(input: PathBuf, limit: usize) -> Result<()> {
    let mime = guess_mime(&input);
    if DocumentFormat::from_mime(mime).is_none() {
        anyhow::bail!("Not a PDF or EPUB: {}", input.display());
    }

    let data = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let text = tokio::task::spawn_blocking(move || extract_text(&data, mime, limit))
        .await
        .context("Text extraction task failed")?;

    if text.is_empty() {
        warn!("No text could be extracted from {}", input.display());
    } else {
        println!("{}", text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Verify {
            input,
            content_type,
            title,
            description,
            thumbnail,
            transcription,
            report,
            upload_id,
            json,
        } => {
            run_verify(
                input,
                content_type,
                title,
                description,
                thumbnail,
                transcription,
                report,
                upload_id,
                json,
            )
            .await
        }
        Command::Plan { duration, frames } => run_plan(duration, frames),
        Command::Text { input, limit } => run_text(input, limit).await,
    }
}
