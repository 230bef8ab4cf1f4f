pub mod gemini;
pub mod heuristic;
pub mod parse;

pub use gemini::GeminiClassifier;
pub use heuristic::heuristic_verdict;
pub use parse::parse_classifier_response;

use crate::error::Result;
use crate::media::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Images sent to the classifier per request.
pub const MAX_CLASSIFIER_IMAGES: usize = 3;

/// Flag set on every verdict produced without the classifier.
pub const FLAG_HEURISTIC: &str = "heuristic_fallback";

/// Flag set when the classifier was configured but failed.
pub const FLAG_CLASSIFIER_ERROR: &str = "classifier_error";

/// Upload category as chosen by the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Videos,
    Music,
    Audio,
    Books,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Videos => write!(f, "videos"),
            ContentType::Music => write!(f, "music"),
            ContentType::Audio => write!(f, "audio"),
            ContentType::Books => write!(f, "books"),
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "videos" | "video" => Ok(ContentType::Videos),
            "music" => Ok(ContentType::Music),
            "audio" => Ok(ContentType::Audio),
            "books" | "book" => Ok(ContentType::Books),
            _ => Err(format!(
                "Unknown content type: {}. Use 'videos', 'music', 'audio' or 'books'",
                s
            )),
        }
    }
}

/// An image attached to a moderation request.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl From<&Frame> for ImageInput {
    fn from(frame: &Frame) -> Self {
        Self {
            mime_type: Frame::MIME_TYPE.to_string(),
            data: frame.data.clone(),
        }
    }
}

/// Everything the classifier gets to see about one upload.
#[derive(Debug, Clone)]
pub struct ModerationRequest {
    pub content_type: ContentType,
    pub title: String,
    pub description: String,
    /// Audio transcript, or extracted text for books.
    pub transcript: Option<String>,
    pub frames: Vec<ImageInput>,
    pub thumbnail: Option<ImageInput>,
}

impl ModerationRequest {
    pub fn new(content_type: ContentType, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            content_type,
            title: title.into(),
            description: description.into(),
            transcript: None,
            frames: Vec::new(),
            thumbnail: None,
        }
    }

    /// Thumbnail first, then frames, capped at [`MAX_CLASSIFIER_IMAGES`].
    pub fn images(&self) -> Vec<&ImageInput> {
        self.thumbnail
            .iter()
            .chain(self.frames.iter())
            .take(MAX_CLASSIFIER_IMAGES)
            .collect()
    }

    /// All free text, for keyword matching.
    pub fn combined_text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.description);
        if let Some(ref transcript) = self.transcript {
            text.push(' ');
            text.push_str(transcript);
        }
        text
    }
}

/// Outcome of moderating one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    is_approved: bool,
    confidence: f64,
    reason: String,
    flags: BTreeSet<String>,
    requires_review: bool,
}

impl ModerationVerdict {
    /// Build a verdict; `confidence` is clamped to `[0, 1]` and NaN becomes 0.
    pub fn new(
        is_approved: bool,
        confidence: f64,
        reason: impl Into<String>,
        flags: impl IntoIterator<Item = String>,
        requires_review: bool,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            is_approved,
            confidence,
            reason: reason.into(),
            flags: flags.into_iter().collect(),
            requires_review,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.is_approved
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    pub fn requires_review(&self) -> bool {
        self.requires_review
    }

    /// Copy of this verdict routed to human review with an extra flag.
    fn escalated(self, flag: &str) -> Self {
        let mut flags = self.flags;
        flags.insert(flag.to_string());
        Self {
            flags,
            requires_review: true,
            ..self
        }
    }
}

/// External content classifier. Returns its raw reply text.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn classify(&self, request: &ModerationRequest) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Turns a moderation request into a verdict, degrading to keyword
/// heuristics when the classifier is missing or failing.
#[derive(Clone, Default)]
pub struct Moderator {
    classifier: Option<Arc<dyn ContentClassifier>>,
}

impl Moderator {
    pub fn new(classifier: Option<Arc<dyn ContentClassifier>>) -> Self {
        Self { classifier }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn moderate(&self, request: &ModerationRequest) -> ModerationVerdict {
        let Some(ref classifier) = self.classifier else {
            info!("No content classifier configured, using keyword heuristics");
            return heuristic_verdict(&request.combined_text());
        };

        match classifier.classify(request).await {
            Ok(raw) => parse_classifier_response(&raw),
            Err(e) => {
                warn!("{} classification failed: {}", classifier.name(), e);
                heuristic_verdict(&request.combined_text()).escalated(FLAG_CLASSIFIER_ERROR)
            }
        }
    }
}
