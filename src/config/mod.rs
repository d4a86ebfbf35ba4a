//! Configuration management for the assistant session

pub mod file;

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::{Error, Result};
use file::ConfigFile;

/// Default model for recorded voice turns
pub const DEFAULT_VOICE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default model for typed chat turns
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-pro";

/// Default microphone sample rate (16kHz for speech)
pub const DEFAULT_CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend connection settings
    pub backend: BackendConfig,

    /// Session behaviour settings
    pub session: SessionConfig,

    /// Audio settings
    pub audio: AudioConfig,

    /// Fallback speech settings
    pub speech: SpeechConfig,
}

/// Backend connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL all endpoint paths are resolved against
    pub base_url: Url,

    /// Voice endpoint path
    pub voice_path: String,

    /// Chat endpoint path
    pub chat_path: String,

    /// Optional bearer token
    pub token: Option<SecretString>,

    /// Upper bound on a single backend request
    pub timeout: Duration,
}

/// Models and request options sent with each turn
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model for recorded voice turns
    pub voice_model: String,

    /// Model for typed chat turns
    pub chat_model: String,

    /// Chat sampling temperature
    pub temperature: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice_model: DEFAULT_VOICE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.7,
        }
    }
}

/// Audio settings
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Preferred microphone sample rate
    pub capture_sample_rate: u32,

    /// Initial output volume (0.0 to 1.0)
    pub output_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: DEFAULT_CAPTURE_SAMPLE_RATE,
            output_volume: 1.0,
        }
    }
}

/// Fallback speech settings
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Program override; auto-detected when `None`
    pub program: Option<String>,

    /// Voice language
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: None,
            language: "en-GB".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting backend URL is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file overlaid with environment lookups
    ///
    /// Priority: environment → config file → defaults
    ///
    /// # Errors
    ///
    /// Returns error if the resulting backend URL is invalid
    pub fn from_sources(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = env("ESTIMATE_VOICE_API_BASE")
            .or(file.backend.base_url)
            .unwrap_or_else(|| "http://localhost:8787/api".to_string());
        let base_url = parse_base_url(&base_url)?;

        let token = env("ESTIMATE_VOICE_TOKEN")
            .or(file.backend.token)
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        let backend = BackendConfig {
            base_url,
            voice_path: file
                .backend
                .voice_path
                .unwrap_or_else(|| "assistant/voice".to_string()),
            chat_path: file
                .backend
                .chat_path
                .unwrap_or_else(|| "assistant/chat".to_string()),
            token,
            timeout: Duration::from_secs(file.backend.timeout_secs.unwrap_or(60)),
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            voice_model: env("ESTIMATE_VOICE_VOICE_MODEL")
                .or(file.models.voice)
                .unwrap_or(defaults.voice_model),
            chat_model: env("ESTIMATE_VOICE_CHAT_MODEL")
                .or(file.models.chat)
                .unwrap_or(defaults.chat_model),
            temperature: file.models.temperature.unwrap_or(defaults.temperature),
        };

        let audio = AudioConfig {
            capture_sample_rate: file
                .audio
                .capture_sample_rate
                .unwrap_or(DEFAULT_CAPTURE_SAMPLE_RATE),
            output_volume: file.audio.output_volume.unwrap_or(1.0).clamp(0.0, 1.0),
        };

        let speech_defaults = SpeechConfig::default();
        let speech = SpeechConfig {
            program: file.speech.program,
            language: file.speech.language.unwrap_or(speech_defaults.language),
        };

        tracing::debug!(
            base_url = %backend.base_url,
            voice_model = %session.voice_model,
            chat_model = %session.chat_model,
            "configuration resolved"
        );

        Ok(Self {
            backend,
            session,
            audio,
            speech,
        })
    }
}

/// Parse the backend base URL, forcing a trailing slash so endpoint paths join beneath it
fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| Error::Config(format!("invalid backend url {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use file::{BackendFileConfig, ModelsFileConfig};

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::from_sources(ConfigFile::default(), |_| None).unwrap();
        assert_eq!(config.session.voice_model, DEFAULT_VOICE_MODEL);
        assert_eq!(config.session.chat_model, DEFAULT_CHAT_MODEL);
        assert!(config.backend.token.is_none());
        assert_eq!(config.audio.capture_sample_rate, DEFAULT_CAPTURE_SAMPLE_RATE);
        assert!(config.backend.base_url.as_str().ends_with('/'));
    }

    #[test]
    fn env_overrides_file() {
        let file = ConfigFile {
            backend: BackendFileConfig {
                base_url: Some("https://file.example.com/api".to_string()),
                token: Some("from-file".to_string()),
                ..Default::default()
            },
            models: ModelsFileConfig {
                chat: Some("file-model".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let config = Config::from_sources(file, |key| match key {
            "ESTIMATE_VOICE_TOKEN" => Some("from-env".to_string()),
            "ESTIMATE_VOICE_CHAT_MODEL" => Some("env-model".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.backend.base_url.as_str(), "https://file.example.com/api/");
        assert_eq!(
            config.backend.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("from-env".to_string())
        );
        assert_eq!(config.session.chat_model, "env-model");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let result = Config::from_sources(ConfigFile::default(), |key| {
            (key == "ESTIMATE_VOICE_API_BASE").then(|| "not a url".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
