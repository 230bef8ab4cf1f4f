pub mod config;
pub mod document;
pub mod error;
pub mod gemini;
pub mod media;
pub mod moderate;
pub mod pipeline;
pub mod progress;
pub mod transcribe;

pub use config::{Config, Provider};
pub use error::{Result, VerifyError};
pub use moderate::{ContentType, ModerationVerdict};
pub use pipeline::{
    PostVerifyHook, VerificationJob, VerificationOutcome, VerificationService, VerificationStats,
};
pub use progress::{ProgressEvent, ProgressSink, Stage};
