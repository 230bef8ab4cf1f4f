use crate::error::{Result, VerifyError};
use crate::transcribe::Transcriber;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI Whisper API endpoint.
const WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Maximum file size for Whisper API (25 MB).
const MAX_FILE_SIZE: usize = 25 * 1024 * 1024;

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI transcription model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhisperModel {
    #[default]
    #[serde(rename = "whisper-1")]
    Whisper1,
    #[serde(rename = "gpt-4o-transcribe")]
    Gpt4oTranscribe,
    #[serde(rename = "gpt-4o-mini-transcribe")]
    Gpt4oMiniTranscribe,
}

impl WhisperModel {
    fn as_str(&self) -> &'static str {
        match self {
            WhisperModel::Whisper1 => "whisper-1",
            WhisperModel::Gpt4oTranscribe => "gpt-4o-transcribe",
            WhisperModel::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
        }
    }
}

impl std::fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WhisperModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whisper-1" | "whisper" => Ok(WhisperModel::Whisper1),
            "gpt-4o-transcribe" => Ok(WhisperModel::Gpt4oTranscribe),
            "gpt-4o-mini-transcribe" => Ok(WhisperModel::Gpt4oMiniTranscribe),
            _ => Err(format!(
                "Unknown Whisper model: {}. Use 'whisper-1', 'gpt-4o-transcribe' or 'gpt-4o-mini-transcribe'",
                s
            )),
        }
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("Could not build HTTP client with timeout ({}), using defaults", e);
            reqwest::Client::new()
        })
}

/// OpenAI Whisper API client.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: WhisperModel,
    language: Option<String>,
    retry_delay_ms: u64,
}

impl WhisperClient {
    /// Create a new Whisper client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: http_client(REQUEST_TIMEOUT),
            api_key,
            url: WHISPER_API_URL.to_string(),
            model: WhisperModel::default(),
            language: None,
            retry_delay_ms: BASE_DELAY_MS,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: WhisperModel) -> Self {
        self.model = model;
        self
    }

    /// Set the source language (ISO 639-1 code).
    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    /// Send requests to another transcription endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    fn file_name_for(mime_type: &str) -> &'static str {
        match mime_type {
            "audio/mpeg" | "audio/mp3" => "audio.mp3",
            "audio/mp4" | "audio/m4a" => "audio.m4a",
            "audio/flac" => "audio.flac",
            "audio/ogg" => "audio.ogg",
            "audio/webm" => "audio.webm",
            _ => "audio.wav",
        }
    }

    /// Build the multipart form for the API request.
    fn build_form(&self, audio: &[u8], mime_type: &str) -> Result<Form> {
        let file_part = Part::bytes(audio.to_vec())
            .file_name(Self::file_name_for(mime_type))
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.as_str())
            .text("response_format", "json");

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        Ok(form)
    }

    /// Make the API request (form is consumed, so no retries at this level).
    async fn call_api(&self, form: Form) -> Result<WhisperResponse> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        if status.is_success() {
            let body = response.text().await?;
            let parsed: WhisperResponse = serde_json::from_str(&body)?;
            return Ok(parsed);
        }

        let error_body = response.text().await.unwrap_or_default();

        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
            return Err(VerifyError::Api(format!(
                "Whisper API error ({}): {} ({})",
                status.as_u16(),
                api_error.error.message,
                api_error.error.r#type
            )));
        }

        Err(VerifyError::Api(format!(
            "Whisper API error ({}): {}",
            status.as_u16(),
            error_body
        )))
    }

    /// Transcribe with retry logic - rebuilds form on each attempt.
    async fn transcribe_with_retry(&self, audio: &[u8], mime_type: &str) -> Result<WhisperResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_delay_ms * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let form = self.build_form(audio, mime_type)?;

            match self.call_api(form).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    // Don't retry on client errors
                    if e.to_string().contains("API error (4") {
                        return Err(e);
                    }
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| VerifyError::Api("Unknown error".to_string())))
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        if audio.len() > MAX_FILE_SIZE {
            return Err(VerifyError::Transcription(format!(
                "Clip too large for Whisper API: {} bytes (max {} bytes)",
                audio.len(),
                MAX_FILE_SIZE
            )));
        }

        debug!("Transcribing {} bytes with Whisper", audio.len());
        let response = self.transcribe_with_retry(audio, mime_type).await?;
        Ok(response.text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    r#type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_model_str() {
        assert_eq!(WhisperModel::Whisper1.as_str(), "whisper-1");
        assert_eq!(WhisperModel::Gpt4oTranscribe.as_str(), "gpt-4o-transcribe");
    }

    #[test]
    fn test_whisper_model_parsing() {
        assert_eq!(
            "gpt-4o-mini-transcribe".parse::<WhisperModel>().unwrap(),
            WhisperModel::Gpt4oMiniTranscribe
        );
        assert_eq!("Whisper-1".parse::<WhisperModel>().unwrap(), WhisperModel::Whisper1);
        assert!("tiny".parse::<WhisperModel>().is_err());
    }

    #[test]
    fn test_file_name_for_mime() {
        assert_eq!(WhisperClient::file_name_for("audio/wav"), "audio.wav");
        assert_eq!(WhisperClient::file_name_for("audio/mpeg"), "audio.mp3");
        assert_eq!(WhisperClient::file_name_for("application/x-unknown"), "audio.wav");
    }

    #[tokio::test]
    async fn test_rejects_oversized_clip() {
        let client = WhisperClient::new("sk-test".to_string());
        let audio = vec![0u8; MAX_FILE_SIZE + 1];
        let result = client.transcribe(&audio, "audio/wav").await;
        assert!(matches!(result, Err(VerifyError::Transcription(_))));
    }
}
