//! Conversation session management.
//!
//! Sessions live in memory behind a map of per-session FIFO mutexes. A turn
//! holds its session's mutex for its whole duration, so turns on one session
//! are serialized while turns on different sessions run concurrently.

use crate::context::{PROJECT_ID, SessionContext};
use crate::error::SessionError;
use crate::intent::IntentRecognizer;
use crate::message::ChatMessage;
use crate::tool::ToolInvoker;
use chrono::{DateTime, TimeDelta, Utc};
use parley_core::SessionId;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument};

/// Exclusive access to one session for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<ChatSession>;

type SessionSlot = Arc<Mutex<ChatSession>>;

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// The user who owns this session.
    pub user_id: Option<String>,
    /// The project this session is about.
    pub project_id: Option<String>,
    /// When the session was created.
    pub start_time: DateTime<Utc>,
    /// When the session last processed a turn.
    pub last_activity: DateTime<Utc>,
    /// Entities extracted from the conversation.
    pub context: SessionContext,
    /// Messages in this session, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Condensed form of older turns.
    pub summary: Option<String>,
    #[serde(skip)]
    retired: bool,
}

impl ChatSession {
    /// Creates a new session.
    ///
    /// A known project id seeds the context.
    #[must_use]
    pub fn new(id: SessionId, user_id: Option<String>, project_id: Option<String>) -> Self {
        let now = Utc::now();
        let mut context = SessionContext::new();
        if let Some(project) = &project_id {
            context.insert_if_absent(PROJECT_ID, project.clone());
        }
        Self {
            id,
            user_id,
            project_id,
            start_time: now,
            last_activity: now,
            context,
            messages: Vec::new(),
            summary: None,
            retired: false,
        }
    }

    /// Refreshes the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Appends a message.
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn fill_owner(&mut self, user_id: Option<&str>, project_id: Option<&str>) {
        if self.user_id.is_none() {
            self.user_id = user_id.map(str::to_string);
        }
        if self.project_id.is_none()
            && let Some(project) = project_id
        {
            self.project_id = Some(project.to_string());
            self.context.insert_if_absent(PROJECT_ID, project);
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity after which a session is swept.
    pub max_age_secs: u64,
    /// How often the server runs the sweep.
    pub sweep_interval_secs: u64,
    /// Whether turns on unknown ids create the session.
    pub auto_create: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 3600,
            sweep_interval_secs: 300,
            auto_create: true,
        }
    }
}

impl SessionConfig {
    /// Returns the maximum session age.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Returns the sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// In-memory store of active sessions.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    recognizer: IntentRecognizer,
    tools: Arc<dyn ToolInvoker>,
    config: SessionConfig,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("recognizer", &self.recognizer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Creates a store that recognizes intents against the invoker's catalog.
    #[must_use]
    pub fn new(tools: Arc<dyn ToolInvoker>, config: SessionConfig) -> Self {
        let recognizer = IntentRecognizer::new(tools.list_tools());
        Self {
            sessions: RwLock::new(HashMap::new()),
            recognizer,
            tools,
            config,
        }
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the intent recognizer.
    #[must_use]
    pub fn recognizer(&self) -> &IntentRecognizer {
        &self.recognizer
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns whether no sessions are live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Creates a session with a fresh id.
    pub async fn create_session(
        &self,
        user_id: Option<String>,
        project_id: Option<String>,
    ) -> ChatSession {
        let session = ChatSession::new(SessionId::new(), user_id, project_id);
        self.sessions
            .write()
            .await
            .insert(session.id, Arc::new(Mutex::new(session.clone())));
        info!(session_id = %session.id, "session created");
        session
    }

    /// Registers a session under a caller-supplied id, keeping any existing one.
    pub async fn register_session(
        &self,
        id: SessionId,
        user_id: Option<&str>,
        project_id: Option<&str>,
    ) {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&id) {
            let session = ChatSession::new(
                id,
                user_id.map(str::to_string),
                project_id.map(str::to_string),
            );
            sessions.insert(id, Arc::new(Mutex::new(session)));
            info!(session_id = %id, "session registered");
        }
    }

    /// Returns a snapshot of a session.
    pub async fn get_session(&self, id: SessionId) -> Option<ChatSession> {
        let slot = self.sessions.read().await.get(&id).cloned()?;
        let session = slot.lock().await;
        (!session.retired).then(|| session.clone())
    }

    /// Returns a session's messages, or nothing when it does not exist.
    pub async fn session_messages(&self, id: SessionId) -> Vec<ChatMessage> {
        self.get_session(id)
            .await
            .map(|session| session.messages)
            .unwrap_or_default()
    }

    async fn resolve_slot(
        &self,
        id: SessionId,
        user_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<SessionSlot, Report<SessionError>> {
        if let Some(slot) = self.sessions.read().await.get(&id) {
            return Ok(Arc::clone(slot));
        }
        if !self.config.auto_create {
            return Err(SessionError::NotFound { id }.into());
        }

        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(id).or_insert_with(|| {
            info!(session_id = %id, "session created on first turn");
            Arc::new(Mutex::new(ChatSession::new(
                id,
                user_id.map(str::to_string),
                project_id.map(str::to_string),
            )))
        });
        Ok(Arc::clone(slot))
    }

    /// Acquires exclusive access to a session.
    ///
    /// Waiters are served in arrival order. A waiter whose session was
    /// removed while it waited resolves the id again.
    pub async fn lock_session(
        &self,
        id: SessionId,
        user_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<SessionGuard, Report<SessionError>> {
        loop {
            let slot = self.resolve_slot(id, user_id, project_id).await?;
            let mut guard = slot.lock_owned().await;
            if guard.retired {
                debug!(session_id = %id, "session retired while waiting");
                continue;
            }
            guard.fill_owner(user_id, project_id);
            return Ok(guard);
        }
    }

    /// Processes one user turn through intent recognition and tool execution.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn process_turn(
        &self,
        id: SessionId,
        text: &str,
        user_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<ChatMessage, Report<SessionError>> {
        let mut session = self.lock_session(id, user_id, project_id).await?;
        session.touch();
        session.add_message(ChatMessage::user(id, text));

        let intent = self.recognizer.recognize_intent(text, &mut session.context);
        let reply = self.recognizer.execute_tool(&intent, self.tools.as_ref());

        let message = ChatMessage::assistant(id, reply).with_metadata("intent", intent.name());
        session.add_message(message.clone());
        debug!(session_id = %id, intent = intent.name(), "turn processed");
        Ok(message)
    }

    /// Removes a session.
    ///
    /// Returns whether the session existed.
    pub async fn delete_session(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        let Some(slot) = removed else {
            return false;
        };
        slot.lock().await.retired = true;
        info!(session_id = %id, "session deleted");
        true
    }

    /// Removes sessions inactive for longer than `max_age`.
    ///
    /// Sessions busy with a turn are skipped. Returns the number removed.
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let snapshot: Vec<(SessionId, SessionSlot)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut removed = 0;
        for (id, slot) in snapshot {
            let Ok(mut session) = slot.try_lock() else {
                continue;
            };
            if session.retired || session.last_activity >= cutoff {
                continue;
            }

            let mut sessions = self.sessions.write().await;
            if sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                sessions.remove(&id);
                session.retired = true;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "expired sessions swept");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::builtin_registry;
    use crate::context::CUSTOMER_ID;
    use crate::intent::FALLBACK_REPLY;

    fn store_with(config: SessionConfig) -> SessionStore {
        let registry = builtin_registry().expect("registry");
        SessionStore::new(Arc::new(registry), config)
    }

    fn store() -> SessionStore {
        store_with(SessionConfig::default())
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = store();
        let session = store
            .create_session(Some("u1".to_string()), Some("p1".to_string()))
            .await;

        let fetched = store.get_session(session.id).await.expect("session");
        assert_eq!(fetched.user_id.as_deref(), Some("u1"));
        assert_eq!(fetched.context.get(PROJECT_ID), Some("p1"));
        assert!(fetched.messages.is_empty());
    }

    #[tokio::test]
    async fn process_turn_creates_session_and_appends_both_turns() {
        let store = store();
        let id = SessionId::new();

        let reply = store
            .process_turn(id, "Create a voucher for project-abc123", Some("u1"), None)
            .await
            .expect("turn");
        assert_eq!(reply.metadata.get("intent").map(String::as_str), Some("create_voucher"));
        assert!(reply.content.contains("VCH-"));

        let session = store.get_session(id).await.expect("session");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.context.get(PROJECT_ID), Some("abc123"));
    }

    #[tokio::test]
    async fn greeting_gets_fallback() {
        let store = store();
        let reply = store
            .process_turn(SessionId::new(), "Hello", None, None)
            .await
            .expect("turn");
        assert_eq!(reply.content, FALLBACK_REPLY);
        assert_eq!(reply.metadata.get("intent").map(String::as_str), Some("none"));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = store();
        let a = SessionId::new();
        let b = SessionId::new();

        store.process_turn(a, "for project-aaa", None, None).await.expect("turn");
        store.process_turn(b, "for customer-bbb", None, None).await.expect("turn");

        let a = store.get_session(a).await.expect("a");
        let b = store.get_session(b).await.expect("b");
        assert_eq!(a.context.get(PROJECT_ID), Some("aaa"));
        assert!(!a.context.contains(CUSTOMER_ID));
        assert_eq!(b.context.get(CUSTOMER_ID), Some("bbb"));
        assert!(!b.context.contains(PROJECT_ID));
        assert_eq!(a.messages.len(), 2);
        assert_eq!(b.messages.len(), 2);
    }

    #[tokio::test]
    async fn context_is_write_once_across_turns() {
        let store = store();
        let id = SessionId::new();
        store.process_turn(id, "for project-first", None, None).await.expect("turn");
        store.process_turn(id, "for project-second", None, None).await.expect("turn");

        let session = store.get_session(id).await.expect("session");
        assert_eq!(session.context.get(PROJECT_ID), Some("first"));
    }

    #[tokio::test]
    async fn unknown_session_without_auto_create() {
        let store = store_with(SessionConfig {
            auto_create: false,
            ..SessionConfig::default()
        });
        let err = store
            .process_turn(SessionId::new(), "Hello", None, None)
            .await
            .expect_err("should fail");
        assert!(matches!(err.current_context(), SessionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn deleted_session_is_not_found() {
        let store = store();
        let session = store.create_session(None, None).await;

        assert!(store.delete_session(session.id).await);
        assert!(!store.delete_session(session.id).await);
        assert!(store.get_session(session.id).await.is_none());
        assert!(store.session_messages(session.id).await.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_sessions() {
        let store = store();
        let old = store.create_session(None, None).await;
        let fresh = store.create_session(None, None).await;

        {
            let mut guard = store.lock_session(old.id, None, None).await.expect("lock");
            guard.last_activity = Utc::now() - TimeDelta::hours(2);
        }
        {
            let mut guard = store.lock_session(fresh.id, None, None).await.expect("lock");
            guard.last_activity = Utc::now() - TimeDelta::minutes(1);
        }

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)).await, 1);
        assert_eq!(store.sweep_expired(Duration::from_secs(3600)).await, 0);
        assert!(store.get_session(old.id).await.is_none());
        assert!(store.get_session(fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn sweep_skips_busy_sessions() {
        let store = store();
        let session = store.create_session(None, None).await;

        let mut guard = store.lock_session(session.id, None, None).await.expect("lock");
        guard.last_activity = Utc::now() - TimeDelta::hours(2);
        assert_eq!(store.sweep_expired(Duration::from_secs(3600)).await, 0);
        drop(guard);

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)).await, 1);
    }

    #[tokio::test]
    async fn waiter_reresolves_session_after_delete() {
        let store = Arc::new(store());
        let session = store.create_session(None, None).await;
        let id = session.id;

        let mut guard = store.lock_session(id, None, None).await.expect("lock");
        guard.add_message(ChatMessage::user(id, "before delete"));

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.process_turn(id, "Hello", None, None).await })
        };
        tokio::task::yield_now().await;

        guard.retired = true;
        store.sessions.write().await.remove(&id);
        drop(guard);

        waiter.await.expect("join").expect("turn");
        let session = store.get_session(id).await.expect("recreated");
        assert_eq!(session.messages.len(), 2);
        assert!(session.messages.iter().all(|m| m.content != "before delete"));
    }
}
