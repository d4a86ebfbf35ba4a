//! Estimate Voice - conversational session manager for a construction-estimating assistant
//!
//! This library provides the voice and text assistant session:
//! - Microphone capture and WAV encoding of recorded turns
//! - Playback of synthesized speech with a platform speech fallback
//! - Sequential, fault-isolated execution of assistant tool calls
//! - A session state machine driving one backend request at a time
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                        UI                           │
//! │  start │ stop │ mute │ volume │ send text │ status  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                SessionController                    │
//! │  Capture │ Encoder │ Playback │ Tools │ Transcript  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Assistant backend                   │
//! │          voice (multipart) │ chat (JSON)            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod tools;
pub mod voice;

pub use backend::{Backend, HttpBackend};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{
    ConversationMessage, InstructionSource, Role, SessionController, SessionState, SessionStatus,
};
pub use tools::{ToolAction, ToolCall, ToolDispatcher, ToolName, ToolRegistry};
