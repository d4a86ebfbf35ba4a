//! Conversation transcript
//!
//! Append-only. The single in-place edit is resolving the "(Sending audio...)"
//! placeholder once the backend reports what it heard.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::backend::{ChatRole, ChatTurn};

/// Author of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Placeholder awaiting the backend's transcript
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl ConversationMessage {
    fn new(role: Role, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            timestamp: Utc::now(),
            pending: false,
        }
    }
}

/// Ordered record of the conversation
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
    revision: u64,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its id
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> Uuid {
        self.append(ConversationMessage::new(role, text.into()))
    }

    /// Append a pending user entry to be resolved once the real text is known
    pub fn push_placeholder(&mut self, text: impl Into<String>) -> Uuid {
        let mut message = ConversationMessage::new(Role::User, text.into());
        message.pending = true;
        self.append(message)
    }

    /// Replace a pending placeholder's text; returns `false` if it is not pending
    pub fn resolve_placeholder(&mut self, id: Uuid, text: impl Into<String>) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id && m.pending) else {
            return false;
        };
        message.text = text.into();
        message.pending = false;
        self.revision += 1;
        true
    }

    /// Remove a pending placeholder; returns `false` if it is not pending
    pub fn discard_placeholder(&mut self, id: Uuid) -> bool {
        let Some(index) = self.messages.iter().position(|m| m.id == id && m.pending) else {
            return false;
        };
        self.messages.remove(index);
        self.revision += 1;
        true
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Incremented on every change
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// User and assistant turns as chat history; system notes and pending entries are skipped
    #[must_use]
    pub fn history(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .filter(|m| !m.pending)
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => ChatRole::User,
                    Role::Assistant => ChatRole::Model,
                    Role::System => return None,
                };
                Some(ChatTurn {
                    role,
                    content: m.text.clone(),
                    timestamp: Some(m.timestamp.to_rfc3339()),
                })
            })
            .collect()
    }

    fn append(&mut self, message: ConversationMessage) -> Uuid {
        let id = message.id;
        tracing::debug!(role = ?message.role, chars = message.text.len(), "transcript append");
        self.messages.push(message);
        self.revision += 1;
        id
    }
}
