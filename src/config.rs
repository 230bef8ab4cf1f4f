use crate::error::{Result, VerifyError};
use crate::gemini::DEFAULT_MODEL;
use crate::transcribe::WhisperModel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Speech-to-text backend used for audio samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Whisper,
    Gemini,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Whisper => write!(f, "whisper"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whisper" => Ok(Provider::Whisper),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(format!("Unknown provider: {}. Use 'whisper' or 'gemini'", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub transcription_provider: Provider,
    pub whisper_model: WhisperModel,
    pub gemini_model: String,
    /// Expected spoken language (ISO 639-1), passed to the transcriber.
    pub language: Option<String>,
    /// Upper bound for a single ffmpeg/ffprobe invocation.
    pub tool_timeout_secs: u64,
    pub frame_count: usize,
    pub frame_width: u32,
    /// ffmpeg `-q:v` value, 2 (best) to 31 (worst).
    pub frame_quality: u8,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Parent directory for job workspaces. Defaults to the OS temp dir.
    pub temp_root: Option<PathBuf>,
    /// Concurrent transcription requests per job.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            transcription_provider: Provider::default(),
            whisper_model: WhisperModel::default(),
            gemini_model: DEFAULT_MODEL.to_string(),
            language: None,
            tool_timeout_secs: 60,
            frame_count: 3,
            frame_width: 320,
            frame_quality: 5,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            temp_root: None,
            concurrency: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                match toml::from_str::<Config>(&contents) {
                    Ok(file_config) => config = file_config,
                    Err(e) => tracing::warn!(
                        "Ignoring unreadable config file {}: {}",
                        config_path.display(),
                        e
                    ),
                }
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Ok(provider) = std::env::var("MEDIAVERIFY_PROVIDER") {
            if let Ok(p) = provider.parse() {
                self.transcription_provider = p;
            }
        }
        if let Ok(model) = std::env::var("MEDIAVERIFY_WHISPER_MODEL") {
            if let Ok(m) = model.parse() {
                self.whisper_model = m;
            }
        }
        if let Ok(model) = std::env::var("MEDIAVERIFY_GEMINI_MODEL") {
            self.gemini_model = model;
        }
        if let Ok(language) = std::env::var("MEDIAVERIFY_LANGUAGE") {
            self.language = Some(language);
        }
        if let Ok(timeout) = std::env::var("MEDIAVERIFY_TOOL_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                self.tool_timeout_secs = t;
            }
        }
        if let Ok(path) = std::env::var("MEDIAVERIFY_FFMPEG") {
            self.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("MEDIAVERIFY_FFPROBE") {
            self.ffprobe_path = path;
        }
        if let Ok(dir) = std::env::var("MEDIAVERIFY_TEMP_DIR") {
            self.temp_root = Some(PathBuf::from(dir));
        }
        if let Ok(concurrency) = std::env::var("MEDIAVERIFY_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout_secs == 0 {
            return Err(VerifyError::Config(
                "Tool timeout must be greater than 0".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(VerifyError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.frame_width == 0 {
            return Err(VerifyError::Config(
                "Frame width must be greater than 0".to_string(),
            ));
        }

        if self.gemini_model.trim().is_empty() {
            return Err(VerifyError::Config(
                "Gemini model name must not be empty".to_string(),
            ));
        }

        if !(2..=31).contains(&self.frame_quality) {
            return Err(VerifyError::Config(format!(
                "Frame quality must be between 2 and 31, got {}",
                self.frame_quality
            )));
        }

        Ok(())
    }

    /// Key for the configured transcription provider, if set.
    pub fn transcription_key(&self) -> Option<&str> {
        match self.transcription_provider {
            Provider::Whisper => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mediaverify").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("whisper".parse::<Provider>().unwrap(), Provider::Whisper);
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("GEMINI".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("unknown".parse::<Provider>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transcription_provider, Provider::Whisper);
        assert_eq!(config.tool_timeout(), Duration::from_secs(60));
        assert_eq!(config.frame_count, 3);
        assert_eq!(config.frame_width, 320);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            tool_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.tool_timeout_secs = 30;
        config.frame_quality = 1;
        assert!(config.validate().is_err());

        config.frame_quality = 5;
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            gemini_api_key = "g-key"
            transcription_provider = "gemini"
            "#,
        )
        .unwrap();

        assert_eq!(config.transcription_provider, Provider::Gemini);
        assert_eq!(config.transcription_key(), Some("g-key"));
        assert_eq!(config.whisper_model, WhisperModel::Whisper1);
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn test_toml_model_and_language() {
        let config: Config = toml::from_str(
            r#"
            whisper_model = "gpt-4o-mini-transcribe"
            gemini_model = "gemini-1.5-pro"
            language = "yo"
            "#,
        )
        .unwrap();

        assert_eq!(config.whisper_model, WhisperModel::Gpt4oMiniTranscribe);
        assert_eq!(config.gemini_model, "gemini-1.5-pro");
        assert_eq!(config.language.as_deref(), Some("yo"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_temp_root_defaults_to_os_temp() {
        let config = Config::default();
        assert_eq!(config.temp_root(), std::env::temp_dir());
    }
}
