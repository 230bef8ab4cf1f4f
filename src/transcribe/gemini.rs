use crate::error::{Result, VerifyError};
use crate::gemini::{GeminiClient, GenerationConfig, Part};
use crate::transcribe::Transcriber;
use async_trait::async_trait;
use tracing::debug;

/// Inline payload limit for `generateContent` (20 MB).
const INLINE_SIZE_THRESHOLD: usize = 20 * 1024 * 1024;

/// Replies meaning "nothing to transcribe".
const NO_SPEECH_MARKERS: &[&str] = &["[no speech]", "no speech", "[silence]"];

/// Transcribes clips with Gemini's audio understanding.
pub struct GeminiTranscriber {
    client: GeminiClient,
    language: Option<String>,
}

impl GeminiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self::with_client(GeminiClient::new(api_key))
    }

    pub fn with_client(client: GeminiClient) -> Self {
        Self {
            client,
            language: None,
        }
    }

    /// Set the expected spoken language.
    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    fn build_prompt(&self) -> String {
        let mut prompt = String::from(
            "Transcribe the speech and sung lyrics in this audio clip verbatim as plain text.\n",
        );
        if let Some(ref lang) = self.language {
            prompt.push_str(&format!("The audio is mostly in {} language.\n", lang));
        }
        prompt.push_str(
            "Do not add timestamps, speaker labels or commentary. \
             If there is no speech, reply with [no speech].",
        );
        prompt
    }
}

/// Strip reply noise and map "no speech" markers to an empty transcript.
fn clean_reply(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if NO_SPEECH_MARKERS
        .iter()
        .any(|marker| joined.eq_ignore_ascii_case(marker))
    {
        String::new()
    } else {
        joined
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        if audio.len() >= INLINE_SIZE_THRESHOLD {
            return Err(VerifyError::Transcription(format!(
                "Clip too large for inline upload: {} bytes",
                audio.len()
            )));
        }

        debug!("Transcribing {} bytes with Gemini", audio.len());

        let parts = vec![Part::text(self.build_prompt()), Part::inline(mime_type, audio)];
        let config = GenerationConfig {
            temperature: Some(0.0),
            max_output_tokens: Some(8192),
        };

        let text = self.client.generate(parts, Some(config)).await?;
        Ok(clean_reply(&text))
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_basic() {
        let transcriber = GeminiTranscriber::new("test-key".to_string());
        let prompt = transcriber.build_prompt();
        assert!(prompt.contains("Transcribe"));
        assert!(prompt.contains("[no speech]"));
    }

    #[test]
    fn test_build_prompt_with_language() {
        let transcriber = GeminiTranscriber::new("test-key".to_string()).with_language("yo".to_string());
        assert!(transcriber.build_prompt().contains("yo language"));
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply("  Praise the Lord\n\nHallelujah \n"), "Praise the Lord Hallelujah");
        assert_eq!(clean_reply("[No Speech]"), "");
        assert_eq!(clean_reply(""), "");
    }
}
