//! Message types for conversations.

use chrono::{DateTime, Utc};
use parley_core::{MessageId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

impl MessageRole {
    /// Returns the lowercase role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// The session this message belongs to.
    pub session_id: SessionId,
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Free-form annotations (recognized intent, tool name, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ChatMessage {
    /// Creates a new message.
    #[must_use]
    pub fn new(session_id: SessionId, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::Assistant, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::System, content)
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
