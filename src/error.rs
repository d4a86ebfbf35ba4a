//! Error types for the estimate voice assistant

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running an assistant session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was denied or is unsupported
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Synthesized speech payload could not be decoded
    #[error("audio decode error: {0}")]
    AudioDecode(String),

    /// Request failed to reach the backend
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("{0}")]
    Backend(String),

    /// Another backend request is still outstanding
    #[error("session busy: {0}")]
    Busy(&'static str),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Text shown to the user in the conversation transcript
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(detail) => detail.clone(),
            Self::Network(_) => {
                "Network connection failed. Please check your internet connection and try again."
                    .to_string()
            }
            Self::Permission(detail) => format!("Could not access the microphone: {detail}"),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Backend(format!("invalid response from assistant backend: {e}"))
        } else {
            Self::Network(e.to_string())
        }
    }
}
