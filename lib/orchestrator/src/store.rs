//! Durable conversation history.
//!
//! The orchestrator persists every turn through a [`MessageStore`]. Archived
//! messages are kept for audit but excluded from the context sent to the
//! model; the session summary stands in for them.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::{MessageId, SessionId};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Kind of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A conversational turn.
    Text,
    /// Instructions or tool output addressed to the model.
    System,
}

/// Lifecycle status of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Part of the context sent to the model.
    Active,
    /// Folded into the summary.
    Archived,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

/// A persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: SessionId,
    pub user_id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What the model sees of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    /// Active messages, oldest first.
    pub messages: Vec<StoredMessage>,
    /// Summary of archived messages.
    pub summary: Option<String>,
}

/// Trait for conversation persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Creates a session.
    async fn create_session(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<StoredSession, Report<StoreError>>;

    /// Appends a message to a session.
    async fn save_message(
        &self,
        session_id: SessionId,
        content: &str,
        sender_id: &str,
        kind: MessageKind,
        status: MessageStatus,
    ) -> Result<StoredMessage, Report<StoreError>>;

    /// Returns the active messages and summary of a session.
    async fn conversation_context(
        &self,
        session_id: SessionId,
    ) -> Result<ConversationContext, Report<StoreError>>;

    /// Lists a user's sessions, oldest first.
    async fn user_sessions(&self, user_id: &str) -> Result<Vec<StoredSession>, Report<StoreError>>;

    /// Returns every message of a session, archived ones included.
    async fn all_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<StoredMessage>, Report<StoreError>>;

    /// Deletes a session and its messages. Returns whether it existed.
    async fn delete_session(&self, session_id: SessionId) -> Result<bool, Report<StoreError>>;

    /// Replaces the session summary and archives the given messages.
    async fn apply_summary(
        &self,
        session_id: SessionId,
        summary: &str,
        archived_ids: &[MessageId],
    ) -> Result<(), Report<StoreError>>;
}

#[derive(Debug)]
struct SessionRecord {
    session: StoredSession,
    messages: Vec<StoredMessage>,
}

/// In-memory [`MessageStore`].
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(session_id: SessionId) -> Report<StoreError> {
    StoreError::SessionNotFound { id: session_id }.into()
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_session(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<StoredSession, Report<StoreError>> {
        let session = StoredSession {
            id: SessionId::new(),
            user_id: user_id.to_string(),
            title: title.map(str::to_string),
            summary: None,
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(
            session.id,
            SessionRecord {
                session: session.clone(),
                messages: Vec::new(),
            },
        );
        Ok(session)
    }

    async fn save_message(
        &self,
        session_id: SessionId,
        content: &str,
        sender_id: &str,
        kind: MessageKind,
        status: MessageStatus,
    ) -> Result<StoredMessage, Report<StoreError>> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found(session_id))?;
        let message = StoredMessage {
            id: MessageId::new(),
            session_id,
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind,
            status,
            created_at: Utc::now(),
        };
        record.messages.push(message.clone());
        Ok(message)
    }

    async fn conversation_context(
        &self,
        session_id: SessionId,
    ) -> Result<ConversationContext, Report<StoreError>> {
        let sessions = self.sessions.read().await;
        let record = sessions.get(&session_id).ok_or_else(|| not_found(session_id))?;
        Ok(ConversationContext {
            messages: record
                .messages
                .iter()
                .filter(|m| m.status == MessageStatus::Active)
                .cloned()
                .collect(),
            summary: record.session.summary.clone(),
        })
    }

    async fn user_sessions(&self, user_id: &str) -> Result<Vec<StoredSession>, Report<StoreError>> {
        let sessions = self.sessions.read().await;
        let mut owned: Vec<StoredSession> = sessions
            .values()
            .filter(|r| r.session.user_id == user_id)
            .map(|r| r.session.clone())
            .collect();
        owned.sort_by_key(|s| (s.created_at, s.id));
        Ok(owned)
    }

    async fn all_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<StoredMessage>, Report<StoreError>> {
        let sessions = self.sessions.read().await;
        let record = sessions.get(&session_id).ok_or_else(|| not_found(session_id))?;
        Ok(record.messages.clone())
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<bool, Report<StoreError>> {
        Ok(self.sessions.write().await.remove(&session_id).is_some())
    }

    async fn apply_summary(
        &self,
        session_id: SessionId,
        summary: &str,
        archived_ids: &[MessageId],
    ) -> Result<(), Report<StoreError>> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found(session_id))?;
        let archived: HashSet<&MessageId> = archived_ids.iter().collect();
        for message in &mut record.messages {
            if archived.contains(&message.id) {
                message.status = MessageStatus::Archived;
            }
        }
        record.session.summary = Some(summary.to_string());
        Ok(())
    }
}
