//! Session state and the status snapshot published to observers

use std::fmt;

use serde::Serialize;

/// Lifecycle of the voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No microphone held; ready to start
    #[default]
    Idle,
    /// Acquiring the microphone
    Connecting,
    /// Recording
    Active,
    /// Utterance sent, waiting for the backend
    AwaitingReply,
    /// A failure is being reported; always followed by `Idle`
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::AwaitingReply => "awaiting-reply",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything a UI needs to render the session controls
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub mic_muted: bool,
    pub output_muted: bool,
    pub output_volume: f32,
    /// A backend request is outstanding
    pub replying: bool,
    /// Synthesized speech is playing
    pub speaking: bool,
    pub last_error: Option<String>,
    pub transcript_revision: u64,
}

impl SessionStatus {
    /// Whether typed input should be accepted
    #[must_use]
    pub fn accepts_text(&self) -> bool {
        self.state == SessionState::Idle && !self.replying
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            mic_muted: false,
            output_muted: false,
            output_volume: 1.0,
            replying: false,
            speaking: false,
            last_error: None,
            transcript_revision: 0,
        }
    }
}
