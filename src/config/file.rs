//! TOML configuration file loading
//!
//! Supports `~/.config/estimate-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Assistant backend configuration
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Model selection
    #[serde(default)]
    pub models: ModelsFileConfig,

    /// Audio configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Fallback speech configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL of the assistant backend (e.g. "https://example.com/api")
    pub base_url: Option<String>,

    /// Path of the voice endpoint relative to the base URL
    pub voice_path: Option<String>,

    /// Path of the chat endpoint relative to the base URL
    pub chat_path: Option<String>,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Model configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelsFileConfig {
    /// Model used for recorded voice turns
    pub voice: Option<String>,

    /// Model used for typed chat turns
    pub chat: Option<String>,

    /// Sampling temperature for chat turns
    pub temperature: Option<f32>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Preferred microphone sample rate
    pub capture_sample_rate: Option<u32>,

    /// Initial assistant output volume (0.0 to 1.0)
    pub output_volume: Option<f32>,
}

/// Fallback speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Speech program to use instead of auto-detection (e.g. "espeak-ng")
    pub program: Option<String>,

    /// Voice language (e.g. "en-GB")
    pub language: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match read_config_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Read and parse a TOML config file
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the file cannot be read and [`crate::Error::Toml`] if it is not
/// valid configuration
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/estimate-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("estimate-voice").join("config.toml"))
}
