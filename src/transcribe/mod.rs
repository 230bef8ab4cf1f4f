pub mod gemini;
pub mod orchestrator;
pub mod whisper;

pub use gemini::GeminiTranscriber;
pub use orchestrator::{TranscriptionOrchestrator, TranscriptionStats};
pub use whisper::{WhisperClient, WhisperModel};

use crate::config::{Config, Provider};
use crate::error::{Result, VerifyError};
use crate::gemini::GeminiClient;
use async_trait::async_trait;

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one audio clip to plain text.
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Build the transcriber for `provider` from the configured keys.
pub fn create_transcriber(provider: Provider, config: &Config) -> Result<Box<dyn Transcriber>> {
    match provider {
        Provider::Whisper => {
            let key = config.openai_api_key.clone().ok_or_else(|| {
                VerifyError::Config(
                    "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-..."
                        .to_string(),
                )
            })?;
            let mut client = WhisperClient::new(key).with_model(config.whisper_model);
            if let Some(ref language) = config.language {
                client = client.with_language(language.clone());
            }
            Ok(Box::new(client))
        }
        Provider::Gemini => {
            let key = config.gemini_api_key.clone().ok_or_else(|| {
                VerifyError::Config(
                    "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey"
                        .to_string(),
                )
            })?;
            let client = GeminiClient::new(key).with_model(config.gemini_model.clone());
            let mut transcriber = GeminiTranscriber::with_client(client);
            if let Some(ref language) = config.language {
                transcriber = transcriber.with_language(language.clone());
            }
            Ok(Box::new(transcriber))
        }
    }
}
