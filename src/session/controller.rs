//! Session controller
//!
//! Owns the microphone pipeline, the playback engine and the conversation transcript,
//! and drives one voice or text turn at a time against the backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::status::{SessionState, SessionStatus};
use super::transcript::{ConversationMessage, Role, Transcript};
use crate::backend::{Backend, ChatOptions, ChatRequest, ChatTurn, VoiceRequest, VoiceResponse};
use crate::config::SessionConfig;
use crate::tools::{ToolCall, ToolDispatcher, ToolRegistry};
use crate::voice::{AudioChunk, CapturePipeline, PlaybackEngine, Utterance};
use crate::{Error, Result};

const STARTING: &str = "Starting voice recording...";
const RECORDING: &str = "Recording started. Speak now.";
const STOPPED: &str = "Voice recording stopped.";
const SENDING_AUDIO: &str = "(Sending audio...)";
const AUDIO_INPUT: &str = "(Audio input)";
const NO_REPLY: &str = "(No reply)";
const NOTHING_HEARD: &str = "I didn't hear anything. Please try again.";

/// Supplies the system instruction sent with every request
pub trait InstructionSource: Send + Sync {
    /// Current system instruction; empty means none
    fn system_instruction(&self) -> String;
}

impl<F> InstructionSource for F
where
    F: Fn() -> String + Send + Sync,
{
    fn system_instruction(&self) -> String {
        self()
    }
}

/// Holds the single outstanding-request slot until dropped
struct RequestGuard<'a> {
    slot: &'a AtomicBool,
}

impl<'a> RequestGuard<'a> {
    fn acquire(slot: &'a AtomicBool) -> Option<Self> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { slot })
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    last_error: Option<String>,
}

/// Conversational session: the control surface consumed by the UI
pub struct SessionController {
    settings: SessionConfig,
    capture: CapturePipeline,
    playback: PlaybackEngine,
    backend: Arc<dyn Backend>,
    dispatcher: ToolDispatcher,
    instructions: Option<Box<dyn InstructionSource>>,
    on_first_connect: Option<Box<dyn Fn() + Send + Sync>>,
    connected_once: AtomicBool,
    inner: Mutex<Inner>,
    transcript: Mutex<Transcript>,
    in_flight: AtomicBool,
    teardowns: AtomicU64,
    status: watch::Sender<SessionStatus>,
}

impl SessionController {
    /// Assemble a session from its collaborators
    #[must_use]
    pub fn new(
        settings: SessionConfig,
        capture: CapturePipeline,
        playback: PlaybackEngine,
        backend: Arc<dyn Backend>,
        registry: ToolRegistry,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus {
            mic_muted: capture.is_muted(),
            output_muted: playback.is_output_muted(),
            output_volume: playback.volume(),
            ..SessionStatus::default()
        });

        Self {
            settings,
            capture,
            playback,
            backend,
            dispatcher: ToolDispatcher::new(registry),
            instructions: None,
            on_first_connect: None,
            connected_once: AtomicBool::new(false),
            inner: Mutex::new(Inner::default()),
            transcript: Mutex::new(Transcript::new()),
            in_flight: AtomicBool::new(false),
            teardowns: AtomicU64::new(0),
            status,
        }
    }

    /// Use `source` for the system instruction of every request
    #[must_use]
    pub fn with_instructions(mut self, source: impl InstructionSource + 'static) -> Self {
        self.instructions = Some(Box::new(source));
        self
    }

    /// Run `callback` the first time a recording goes live
    #[must_use]
    pub fn on_first_connect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_first_connect = Some(Box::new(callback));
        self
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.snapshot()
    }

    /// Current voice state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    /// Copy of the conversation so far
    #[must_use]
    pub fn transcript(&self) -> Vec<ConversationMessage> {
        self.lock_transcript().messages().to_vec()
    }

    /// Playback engine driving assistant output
    #[must_use]
    pub const fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    /// Start recording a voice turn
    ///
    /// Does nothing unless the session is idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while a reply is still outstanding, or
    /// [`Error::Permission`] if the microphone cannot be acquired
    pub fn start_session(&self) -> Result<()> {
        {
            let mut inner = self.lock_inner();
            if inner.state != SessionState::Idle {
                tracing::debug!(state = %inner.state, "start ignored, session not idle");
                return Ok(());
            }
            if self.in_flight.load(Ordering::Acquire) {
                return Err(Error::Busy("a reply is still outstanding"));
            }
            inner.state = SessionState::Connecting;
            inner.last_error = None;
        }
        self.playback.cancel_speech();
        self.append(Role::System, STARTING);

        let sample_rate = match self.capture.open() {
            Ok(rate) => rate,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start recording");
                self.teardown();
                self.append(Role::System, format!("Error: {}", e.user_message()));
                self.report_failure(&e, SessionState::Connecting);
                return Err(e);
            }
        };

        if let Err(e) = self.playback.open() {
            tracing::warn!(error = %e, "output unavailable, replies will not be voiced");
        }

        self.set_state(SessionState::Active);
        tracing::info!(sample_rate, "recording started");

        let first_connect = !self.connected_once.swap(true, Ordering::AcqRel);
        if let Some(callback) = self.on_first_connect.as_ref().filter(|_| first_connect) {
            callback();
        }

        self.append(Role::System, RECORDING);
        Ok(())
    }

    /// Stop the session, releasing every audio resource
    ///
    /// Stopping an active recording sends the utterance and applies the reply before
    /// returning. Stopping while a reply is outstanding only releases audio; the reply is
    /// still applied when it arrives, but not voiced. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if an active recording cannot claim the request slot
    pub async fn stop_session(&self) -> Result<()> {
        let state = self.state();
        match state {
            SessionState::Idle => {
                self.teardown();
                self.publish();
                Ok(())
            }
            SessionState::Connecting | SessionState::Error => {
                self.teardown();
                self.note_stopped();
                self.set_state(SessionState::Idle);
                Ok(())
            }
            SessionState::AwaitingReply => {
                self.teardown();
                self.note_stopped();
                self.set_state(SessionState::Idle);
                tracing::info!("stopped while awaiting reply, late reply will not be voiced");
                Ok(())
            }
            SessionState::Active => self.finish_recording().await,
        }
    }

    /// Toggle microphone mute; returns the new muted state
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.capture.is_muted();
        self.capture.set_muted(muted);
        tracing::debug!(muted, "microphone mute toggled");
        self.publish();
        muted
    }

    /// Toggle assistant output mute; returns the new muted state
    pub fn toggle_ai_output_mute(&self) -> bool {
        let muted = !self.playback.is_output_muted();
        self.playback.set_output_muted(muted);
        tracing::debug!(muted, "output mute toggled");
        self.publish();
        muted
    }

    /// Set assistant output volume; returns the clamped value now in effect
    pub fn set_output_volume(&self, volume: f32) -> f32 {
        let applied = self.playback.set_volume(volume);
        self.publish();
        applied
    }

    /// Send a typed message and apply the reply
    ///
    /// Blank text is ignored. Backend failures are reported in the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while a voice session is in progress or another request
    /// is outstanding
    pub async fn send_text_message(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let status = self.snapshot();
        if !status.accepts_text() {
            return Err(Error::Busy(if status.state == SessionState::Idle {
                "a reply is still outstanding"
            } else {
                "a voice session is in progress"
            }));
        }
        let Some(guard) = RequestGuard::acquire(&self.in_flight) else {
            return Err(Error::Busy("a reply is still outstanding"));
        };

        let mut conversation = self.lock_transcript().history();
        conversation.push(ChatTurn::user(text));
        self.append(Role::User, text);
        self.playback.cancel_speech();
        let epoch = self.teardowns.load(Ordering::Acquire);

        let request = ChatRequest {
            model: self.settings.chat_model.clone(),
            conversation,
            options: ChatOptions {
                temperature: Some(self.settings.temperature),
                max_tokens: None,
            },
            tools: self.dispatcher.registry().declarations(),
            tool_config: None,
            system_instruction: self.system_instruction(),
        };

        match self.backend.send_chat(&request).await {
            Ok(response) => {
                tracing::debug!(
                    id = response.id.as_deref().unwrap_or_default(),
                    total_tokens = response.usage.map(|u| u.total_tokens),
                    "chat reply received"
                );
                let reply = non_empty(response.reply);
                let feedback = self
                    .run_tools(&response.function_calls.unwrap_or_default())
                    .await;

                let spoken = match reply {
                    Some(reply) => {
                        self.append(Role::Assistant, reply.clone());
                        if let Some(feedback) = &feedback {
                            self.append(Role::System, feedback.clone());
                        }
                        Some(reply)
                    }
                    None => {
                        let text = feedback.clone().unwrap_or_else(|| NO_REPLY.to_string());
                        self.append(Role::Assistant, text);
                        feedback
                    }
                };

                if let Some(spoken) = spoken.filter(|_| !self.stopped_since(epoch)) {
                    self.playback.speak_fallback(&spoken);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "text turn failed");
                let message = format!("Error: {}", e.user_message());
                self.append(Role::System, message.clone());
                self.lock_inner().last_error = Some(e.user_message());
                if !self.stopped_since(epoch) {
                    self.playback.speak_fallback(&message);
                }
            }
        }

        drop(guard);
        self.publish();
        Ok(())
    }

    /// Add a transcript-only system note
    pub fn send_system_message(&self, text: impl Into<String>) {
        self.append(Role::System, text);
    }

    async fn finish_recording(&self) -> Result<()> {
        let Some(guard) = RequestGuard::acquire(&self.in_flight) else {
            self.teardown();
            self.set_state(SessionState::Idle);
            return Err(Error::Busy("a reply is still outstanding"));
        };

        self.capture.close();
        let chunks = self.capture.take_chunks();
        let sample_rate = self.capture.sample_rate();
        let epoch = self.teardown();

        self.note_stopped();
        self.set_state(SessionState::AwaitingReply);

        let outcome = self.voice_turn(&chunks, sample_rate, epoch).await;
        drop(guard);

        match outcome {
            Ok(()) => {
                let mut inner = self.lock_inner();
                if inner.state == SessionState::AwaitingReply {
                    inner.state = SessionState::Idle;
                }
            }
            Err(e) => self.report_failure(&e, SessionState::AwaitingReply),
        }
        self.publish();
        Ok(())
    }

    async fn voice_turn(&self, chunks: &[AudioChunk], sample_rate: u32, epoch: u64) -> Result<()> {
        let Some(utterance) = Utterance::from_chunks(chunks, sample_rate) else {
            tracing::info!("no audio captured, skipping backend call");
            self.append(Role::Assistant, NOTHING_HEARD);
            return Ok(());
        };

        let placeholder = self.lock_transcript().push_placeholder(SENDING_AUDIO);
        self.publish();
        tracing::info!(
            duration_ms = utterance.duration().as_millis(),
            sample_rate,
            "sending utterance"
        );

        let response = match self.send_utterance(&utterance).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "voice turn failed");
                self.lock_transcript().discard_placeholder(placeholder);
                self.append(Role::System, format!("Error: {}", e.user_message()));
                return Err(e);
            }
        };

        tracing::debug!(
            id = response.id.as_deref().unwrap_or_default(),
            "voice reply received"
        );
        let VoiceResponse {
            transcript,
            reply,
            tts_audio_url,
            function_calls,
            ..
        } = response;

        let heard = non_empty(transcript).unwrap_or_else(|| AUDIO_INPUT.to_string());
        self.lock_transcript().resolve_placeholder(placeholder, heard);

        let reply = non_empty(reply);
        self.append(
            Role::Assistant,
            reply.clone().unwrap_or_else(|| NO_REPLY.to_string()),
        );

        let feedback = self.run_tools(&function_calls.unwrap_or_default()).await;
        if let Some(feedback) = &feedback {
            self.append(Role::System, feedback.clone());
        }

        if self.stopped_since(epoch) {
            tracing::debug!("session stopped before reply, skipping playback");
            return Ok(());
        }

        match non_empty(tts_audio_url) {
            Some(reference) => self.play_speech(&reference, epoch).await,
            None => {
                if let Some(text) = reply.or(feedback) {
                    self.playback.speak_fallback(&text);
                }
            }
        }
        Ok(())
    }

    async fn send_utterance(&self, utterance: &Utterance) -> Result<VoiceResponse> {
        let wav = utterance.to_wav()?;
        let request = VoiceRequest {
            model: self.settings.voice_model.clone(),
            system_instruction: self.system_instruction(),
            tools: self.dispatcher.registry().declarations(),
        };
        self.backend.send_voice(wav, &request).await
    }

    /// Fetch and schedule synthesized speech; failures only skip playback
    async fn play_speech(&self, reference: &str, epoch: u64) {
        if self.playback.is_output_muted() {
            tracing::debug!("output muted, not fetching synthesized speech");
            return;
        }

        let bytes = match self.backend.fetch_speech(reference).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch synthesized speech");
                return;
            }
        };

        if self.stopped_since(epoch) {
            return;
        }
        if let Err(e) = self.playback.play_pcm(&bytes) {
            tracing::warn!(error = %e, "skipping synthesized speech");
        }
        self.publish();
    }

    /// Dispatch calls; returns the feedback text when there is any
    async fn run_tools(&self, calls: &[ToolCall]) -> Option<String> {
        if calls.is_empty() {
            return None;
        }
        tracing::debug!(calls = calls.len(), "dispatching tool calls");
        let feedback = self.dispatcher.dispatch(calls).await.feedback();
        (!feedback.trim().is_empty()).then_some(feedback)
    }

    /// Release capture and playback; returns the new teardown epoch
    fn teardown(&self) -> u64 {
        let released = self.capture.close();
        self.capture.discard();
        let closed = self.playback.close();
        let epoch = self.teardowns.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(released, closed, epoch, "audio resources released");
        epoch
    }

    fn stopped_since(&self, epoch: u64) -> bool {
        self.teardowns.load(Ordering::Acquire) != epoch
    }

    fn note_stopped(&self) {
        let appended = {
            let mut transcript = self.lock_transcript();
            let last_is_system = transcript.last().is_some_and(|m| m.role == Role::System);
            if !transcript.is_empty() && !last_is_system {
                transcript.push(Role::System, STOPPED);
                true
            } else {
                false
            }
        };
        if appended {
            self.publish();
        }
    }

    /// Surface a failure as `Error`, then settle back to `Idle` if still in `from`
    fn report_failure(&self, error: &Error, from: SessionState) {
        {
            let mut inner = self.lock_inner();
            inner.last_error = Some(error.user_message());
            if inner.state != from {
                drop(inner);
                self.publish();
                return;
            }
            inner.state = SessionState::Error;
        }
        self.publish();
        self.set_state(SessionState::Idle);
    }

    fn system_instruction(&self) -> Option<String> {
        self.instructions
            .as_ref()
            .map(|source| source.system_instruction())
            .filter(|s| !s.is_empty())
    }

    fn append(&self, role: Role, text: impl Into<String>) {
        self.lock_transcript().push(role, text);
        self.publish();
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut self.lock_inner().state, state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state");
        }
        self.publish();
    }

    fn snapshot(&self) -> SessionStatus {
        let (state, last_error) = {
            let inner = self.lock_inner();
            (inner.state, inner.last_error.clone())
        };
        SessionStatus {
            state,
            mic_muted: self.capture.is_muted(),
            output_muted: self.playback.is_output_muted(),
            output_volume: self.playback.volume(),
            replying: self.in_flight.load(Ordering::Acquire),
            speaking: self.playback.is_voicing(),
            last_error,
            transcript_revision: self.lock_transcript().revision(),
        }
    }

    fn publish(&self) {
        let status = self.snapshot();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("status", &self.snapshot())
            .field("capture", &self.capture)
            .field("playback", &self.playback)
            .field("tools", self.dispatcher.registry())
            .finish_non_exhaustive()
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_guard_is_exclusive_and_released_on_drop() {
        let slot = AtomicBool::new(false);
        let guard = RequestGuard::acquire(&slot).unwrap();
        assert!(RequestGuard::acquire(&slot).is_none());
        drop(guard);
        assert!(!slot.load(Ordering::Acquire));
        assert!(RequestGuard::acquire(&slot).is_some());
    }

    #[test]
    fn closures_supply_instructions() {
        let source = || "Be concise.".to_string();
        assert_eq!(source.system_instruction(), "Be concise.");
    }

    #[test]
    fn blank_text_is_not_content() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("ok".to_string())), Some("ok".to_string()));
    }
}
