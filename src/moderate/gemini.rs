use super::{ContentClassifier, ModerationRequest};
use crate::error::{Result, VerifyError};
use crate::gemini::{GeminiClient, GenerationConfig, Part};
use async_trait::async_trait;
use tracing::debug;

/// Multi-modal moderation through Gemini.
pub struct GeminiClassifier {
    client: GeminiClient,
}

impl GeminiClassifier {
    pub fn new(api_key: String) -> Self {
        Self::with_client(GeminiClient::new(api_key))
    }

    pub fn with_client(client: GeminiClient) -> Self {
        Self { client }
    }

    fn build_prompt(request: &ModerationRequest) -> String {
        let mut prompt = String::from(
            "You moderate uploads for a Christian gospel media platform. Decide whether \
             the content is appropriate: it must be free of explicit, sexual, violent or \
             hateful material and should be consistent with Christian values.\n\n",
        );

        prompt.push_str(&format!("Content type: {}\n", request.content_type));
        prompt.push_str(&format!("Title: {}\n", request.title));
        prompt.push_str(&format!("Description: {}\n", request.description));

        match request.transcript.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                prompt.push_str(&format!("Transcript or text excerpt:\n{}\n", text));
            }
            _ => prompt.push_str("Transcript: (none available)\n"),
        }

        let images = request.images().len();
        if images > 0 {
            prompt.push_str(&format!(
                "{} image(s) from the upload are attached.\n",
                images
            ));
        }

        prompt.push_str(
            "\nRespond with JSON only, in this exact shape:\n\
             {\"isApproved\": true|false, \"confidence\": 0.0-1.0, \"reason\": \"...\", \
             \"flags\": [\"...\"], \"requiresReview\": true|false}",
        );
        prompt
    }
}

#[async_trait]
impl ContentClassifier for GeminiClassifier {
    async fn classify(&self, request: &ModerationRequest) -> Result<String> {
        let mut parts = vec![Part::text(Self::build_prompt(request))];
        parts.extend(
            request
                .images()
                .into_iter()
                .map(|image| Part::inline(&image.mime_type, &image.data)),
        );

        debug!("Sending moderation request with {} parts", parts.len());

        let config = GenerationConfig {
            temperature: Some(0.1),
            max_output_tokens: Some(1024),
        };
        let reply = self.client.generate(parts, Some(config)).await?;
        if reply.trim().is_empty() {
            return Err(VerifyError::Classification(
                "Gemini returned no verdict".to_string(),
            ));
        }
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }
}
