use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Pipeline phase named in a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Received,
    Validating,
    Analyzing,
    Transcribing,
    Moderating,
    Finalizing,
    Error,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validating => "validating",
            Stage::Analyzing => "analyzing",
            Stage::Transcribing => "transcribing",
            Stage::Moderating => "moderating",
            Stage::Finalizing => "finalizing",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

/// Checkpoint percentages.
pub mod checkpoint {
    pub const RECEIVED: u8 = 10;
    pub const VALIDATING: u8 = 20;
    pub const ANALYZING: u8 = 30;
    pub const TRANSCRIBING: u8 = 50;
    pub const TRANSCRIBED: u8 = 70;
    pub const MODERATING: u8 = 75;
    pub const FINALIZING: u8 = 95;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub upload_id: String,
    pub progress: u8,
    pub stage: Stage,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Finalizing | Stage::Error)
    }
}

/// Receives progress events. Called synchronously from the pipeline.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Per-job relay in front of a sink.
///
/// Percentages never go backwards within a job, and the terminal event is
/// emitted by consuming the reporter, so there is exactly one.
pub struct ProgressReporter {
    upload_id: String,
    sink: Arc<dyn ProgressSink>,
    last: u8,
}

impl ProgressReporter {
    pub fn new(upload_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            upload_id: upload_id.into(),
            sink,
            last: 0,
        }
    }

    pub fn report(&mut self, percent: u8, stage: Stage, message: impl Into<String>) {
        let percent = percent.min(checkpoint::FINALIZING).max(self.last);
        self.last = percent;
        self.emit(percent, stage, message.into());
    }

    /// Terminal success event at 95%.
    pub fn finish(self, message: impl Into<String>) {
        self.emit(checkpoint::FINALIZING, Stage::Finalizing, message.into());
    }

    /// Terminal failure event at 0%.
    pub fn fail(self, message: impl Into<String>) {
        self.emit(0, Stage::Error, message.into());
    }

    fn emit(&self, progress: u8, stage: Stage, message: String) {
        debug!("[{}] {}% {}: {}", self.upload_id, progress, stage, message);
        self.sink.report(ProgressEvent {
            upload_id: self.upload_id.clone(),
            progress,
            stage,
            message,
            timestamp: Utc::now(),
        });
    }
}
