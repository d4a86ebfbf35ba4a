//! Conversational session management
//!
//! [`SessionController`] is the control surface: start/stop recording, mute, volume and
//! typed messages. State changes are published as [`SessionStatus`] snapshots.

mod controller;
mod status;
mod transcript;

pub use controller::{InstructionSource, SessionController};
pub use status::{SessionState, SessionStatus};
pub use transcript::{ConversationMessage, Role, Transcript};
