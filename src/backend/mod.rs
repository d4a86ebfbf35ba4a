//! Assistant backend client
//!
//! The session talks to the backend only through the [`Backend`] trait so tests and
//! alternative transports can stand in for the HTTP client.

mod http;
mod types;

use async_trait::async_trait;

pub use http::HttpBackend;
pub use types::{
    ChatOptions, ChatRequest, ChatResponse, ChatRole, ChatTurn, Usage, VoiceRequest,
    VoiceResponse,
};

use crate::Result;

/// Remote AI backend for voice and text turns
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send one recorded utterance as a WAV file
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Network`] if the request never reached the backend, or
    /// [`crate::Error::Backend`] for a non-success response
    async fn send_voice(&self, audio: Vec<u8>, request: &VoiceRequest) -> Result<VoiceResponse>;

    /// Send a text turn with conversation history
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Network`] if the request never reached the backend, or
    /// [`crate::Error::Backend`] for a non-success response
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Resolve a synthesized-speech reference into raw 16-bit PCM bytes
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be fetched or decoded
    async fn fetch_speech(&self, reference: &str) -> Result<Vec<u8>>;
}
