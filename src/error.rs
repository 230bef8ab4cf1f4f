use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("External tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Media extraction failed: {0}")]
    Extraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Verification cancelled")]
    Cancelled,

    #[error("Invalid upload: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Verification of upload {upload_id} failed: {source}")]
    Job {
        upload_id: String,
        #[source]
        source: Box<VerifyError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VerifyError {
    /// Attach the upload identifier to an error leaving the pipeline.
    pub fn for_job(self, upload_id: &str) -> Self {
        match self {
            VerifyError::Job { .. } => self,
            other => VerifyError::Job {
                upload_id: upload_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any job wrapper removed.
    pub fn root(&self) -> &VerifyError {
        match self {
            VerifyError::Job { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_job_includes_upload_id() {
        let err = VerifyError::Extraction("ffmpeg exited with 1".to_string()).for_job("up-42");
        let message = err.to_string();
        assert!(message.contains("up-42"));
        assert!(message.contains("ffmpeg exited with 1"));
        assert!(matches!(err.root(), VerifyError::Extraction(_)));
    }

    #[test]
    fn test_for_job_does_not_double_wrap() {
        let err = VerifyError::Cancelled.for_job("a").for_job("b");
        assert!(err.to_string().contains(" a "));
        assert!(matches!(err.root(), VerifyError::Cancelled));
    }
}
