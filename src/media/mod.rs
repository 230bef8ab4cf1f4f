pub mod command;
pub mod extract;
pub mod plan;
pub mod probe;
pub mod workspace;

pub use command::ToolRunner;
pub use plan::{plan_audio_samples, plan_frame_timestamps, DEFAULT_FRAME_COUNT};
pub use workspace::{JobWorkspace, ScratchFile};

use crate::config::Config;
use std::time::Duration;

/// Broad media family, derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else if mime.starts_with("audio/") {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// Duration assumed when probing fails.
    pub fn fallback_duration(&self) -> Duration {
        match self {
            MediaKind::Video => Duration::from_secs(10),
            MediaKind::Audio => Duration::from_secs(60),
        }
    }

    /// File extension used for the workspace copy of the input.
    pub fn extension_for(mime: &str) -> &'static str {
        match mime.trim().to_ascii_lowercase().as_str() {
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/webm" => "webm",
            "video/x-matroska" => "mkv",
            "video/x-msvideo" => "avi",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
            "audio/aac" => "aac",
            "audio/ogg" => "ogg",
            "audio/flac" => "flac",
            "audio/webm" => "webm",
            _ => "bin",
        }
    }
}

/// A planned audio window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWindow {
    pub offset: Duration,
    pub duration: Duration,
}

impl SampleWindow {
    pub fn end(&self) -> Duration {
        self.offset + self.duration
    }
}

/// An extracted audio clip, 16kHz mono WAV.
#[derive(Debug, Clone)]
pub struct Sample {
    pub index: usize,
    pub offset: Duration,
    pub duration: Duration,
    pub data: Vec<u8>,
}

impl Sample {
    pub const MIME_TYPE: &'static str = "audio/wav";
}

/// An extracted still image, JPEG.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub timestamp: Duration,
    pub data: Vec<u8>,
}

impl Frame {
    pub const MIME_TYPE: &'static str = "image/jpeg";
}

/// ffmpeg/ffprobe invocation settings shared by every job.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub runner: ToolRunner,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub frame_width: u32,
    pub frame_quality: u8,
}

impl MediaTools {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runner: ToolRunner::new(config.tool_timeout()),
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            frame_width: config.frame_width,
            frame_quality: config.frame_quality,
        }
    }
}
