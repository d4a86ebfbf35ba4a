//! HTTP client for the assistant backend

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use super::Backend;
use super::types::{ChatRequest, ChatResponse, VoiceRequest, VoiceResponse};
use crate::config::BackendConfig;
use crate::voice::decode_base64_audio;
use crate::{Error, Result};

/// Talks to the assistant's voice and chat endpoints over HTTP
pub struct HttpBackend {
    client: Client,
    voice_url: Url,
    chat_url: Url,
    token: Option<SecretString>,
}

impl HttpBackend {
    /// Create a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if an endpoint URL is invalid or the HTTP client cannot be built
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let join = |path: &str| {
            config
                .base_url
                .join(path.trim_start_matches('/'))
                .map_err(|e| Error::Config(format!("invalid endpoint path {path}: {e}")))
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            voice_url: join(&config.voice_path)?,
            chat_url: join(&config.chat_path)?,
            token: config.token.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("voice_url", &self.voice_url.as_str())
            .field("chat_url", &self.chat_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn send_voice(&self, audio: Vec<u8>, request: &VoiceRequest) -> Result<VoiceResponse> {
        let file_name = format!(
            "recorded_audio_{}.wav",
            chrono::Utc::now().timestamp_millis()
        );
        tracing::debug!(audio_bytes = audio.len(), file = %file_name, "sending voice request");

        let form = Form::new()
            .part(
                "file",
                Part::bytes(audio)
                    .file_name(file_name)
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Config(e.to_string()))?,
            )
            .text("payload", serde_json::to_string(request)?);

        let response = self
            .authorize(self.client.post(self.voice_url.clone()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "voice request failed");
                e
            })?;

        read_json(response).await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(
            turns = request.conversation.len(),
            model = %request.model,
            "sending chat request"
        );

        let response = self
            .authorize(self.client.post(self.chat_url.clone()))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        read_json(response).await
    }

    async fn fetch_speech(&self, reference: &str) -> Result<Vec<u8>> {
        if !is_remote(reference) {
            return decode_base64_audio(reference);
        }

        tracing::debug!(url = %reference, "fetching synthesized speech");
        let response = self.authorize(self.client.get(reference)).send().await?;
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let body = response.text().await?;
        decode_base64_audio(&body)
    }
}

fn is_remote(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    tracing::debug!(status = %status, "received response");

    if !status.is_success() {
        return Err(backend_error(response).await);
    }

    Ok(response.json().await?)
}

/// Build a backend error from a failed response, preferring its JSON `message` field
async fn backend_error(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()
            .to_string()
        });

    tracing::error!(status = %status, detail = %detail, "backend error");
    Error::Backend(detail)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(base: &str, voice: &str) -> BackendConfig {
        BackendConfig {
            base_url: Url::parse(base).unwrap(),
            voice_path: voice.to_string(),
            chat_path: "assistant/chat".to_string(),
            token: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoints_resolve_beneath_base() {
        let backend = HttpBackend::new(&config("https://example.com/api/", "/assistant/voice")).unwrap();
        assert_eq!(backend.voice_url.as_str(), "https://example.com/api/assistant/voice");
        assert_eq!(backend.chat_url.as_str(), "https://example.com/api/assistant/chat");
    }

    #[test]
    fn remote_references_are_detected() {
        assert!(is_remote("https://cdn.example.com/a.pcm"));
        assert!(is_remote("HTTP://cdn.example.com/a.pcm"));
        assert!(!is_remote("data:audio/pcm;base64,AAE="));
        assert!(!is_remote("AAE="));
    }

    #[test]
    fn debug_hides_token() {
        let mut cfg = config("https://example.com/api/", "voice");
        cfg.token = Some(SecretString::from("secret-token"));
        let backend = HttpBackend::new(&cfg).unwrap();
        let debug = format!("{backend:?}");
        assert!(!debug.contains("secret-token"));
    }
}
