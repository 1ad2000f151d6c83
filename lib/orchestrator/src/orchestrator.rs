//! Conversation orchestration.
//!
//! A turn runs under its session's lock from the moment the user message is
//! persisted until the assistant reply is persisted:
//!
//! 1. Persist the user message
//! 2. Recognize intent, updating the session context
//! 3. Run the matched tool and inject its outcome as a system message
//! 4. Format the active history and summary into a chat request
//! 5. Call the agent, persist the reply and compact older turns

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, StoreError};
use crate::store::{
    ConversationContext, MessageKind, MessageStatus, MessageStore, StoredMessage, StoredSession,
};
use crate::stream::{StreamEvent, StreamHandle};
use futures::StreamExt;
use parley_ai::{
    HeuristicSummarizer, LlmMessage, MessageRole as LlmRole, Summarizer, TokenBudgeter,
};
use parley_conversation::{
    ChatSession, IntentRecognizer, SessionError, SessionGuard, SessionStore, ToolOutcome,
};
use parley_core::{MessageId, SessionId};
use parley_rpc::proto::{CallToolRequest, ChatMessage, ChatRequest, Role};
use parley_rpc::{ChatRpc, ChatStream, RpcError};
use rootcause::Report;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

const STREAM_EVENT_CAPACITY: usize = 32;

fn store_error(error: Report<StoreError>) -> Report<OrchestratorError> {
    OrchestratorError::from(error.current_context()).into()
}

fn rpc_error(error: Report<RpcError>) -> Report<OrchestratorError> {
    OrchestratorError::Rpc {
        reason: error.current_context().to_string(),
    }
    .into()
}

fn session_error(error: Report<SessionError>) -> Report<OrchestratorError> {
    match error.current_context() {
        SessionError::NotFound { id } => OrchestratorError::SessionNotFound { id: *id }.into(),
    }
}

async fn with_deadline<F: Future>(
    limit: Option<Duration>,
    future: F,
) -> Result<F::Output, OrchestratorError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        None => Ok(future.await),
    }
}

fn wire_role(role: LlmRole) -> Role {
    match role {
        LlmRole::System => Role::System,
        LlmRole::User => Role::User,
        LlmRole::Assistant => Role::Assistant,
    }
}

/// Coordinates persistence, session state and the agent for each turn.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn MessageStore>,
    rpc: Arc<dyn ChatRpc>,
    sessions: Arc<SessionStore>,
    recognizer: Arc<IntentRecognizer>,
    budgeter: TokenBudgeter,
    summarizer: Arc<dyn Summarizer>,
    config: OrchestratorConfig,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("budgeter", &self.budgeter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator, loading the tool catalog from the agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be fetched.
    pub async fn new(
        store: Arc<dyn MessageStore>,
        rpc: Arc<dyn ChatRpc>,
        sessions: Arc<SessionStore>,
        config: OrchestratorConfig,
    ) -> Result<Self, Report<OrchestratorError>> {
        let catalog = with_deadline(config.request_timeout(), rpc.list_tools())
            .await?
            .map_err(rpc_error)?;
        info!(tools = catalog.len(), "loaded tool catalog");

        Ok(Self {
            store,
            rpc,
            sessions,
            recognizer: Arc::new(IntentRecognizer::new(catalog)),
            budgeter: TokenBudgeter::default(),
            summarizer: Arc::new(HeuristicSummarizer::default()),
            config,
        })
    }

    /// Sets the token budgeter.
    #[must_use]
    pub fn with_budgeter(mut self, budgeter: TokenBudgeter) -> Self {
        self.budgeter = budgeter;
        self
    }

    /// Returns the session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Creates a session for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<SessionId, Report<OrchestratorError>> {
        let session = self
            .store
            .create_session(user_id, title)
            .await
            .map_err(store_error)?;
        self.sessions
            .register_session(session.id, Some(user_id), None)
            .await;
        info!(session_id = %session.id, "session created");
        Ok(session.id)
    }

    /// Returns every message of a session, archived ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the session does not exist.
    pub async fn session_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<StoredMessage>, Report<OrchestratorError>> {
        self.store.all_messages(session_id).await.map_err(store_error)
    }

    /// Lists a user's sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn user_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<StoredSession>, Report<OrchestratorError>> {
        self.store.user_sessions(user_id).await.map_err(store_error)
    }

    /// Deletes a session and its history. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn delete_session(
        &self,
        session_id: SessionId,
    ) -> Result<bool, Report<OrchestratorError>> {
        let existed = self
            .store
            .delete_session(session_id)
            .await
            .map_err(store_error)?;
        self.sessions.delete_session(session_id).await;
        Ok(existed)
    }

    /// Returns a snapshot of the live session state.
    pub async fn session_state(&self, session_id: SessionId) -> Option<ChatSession> {
        self.sessions.get_session(session_id).await
    }

    /// Sends a user message and returns the assistant reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the session does not exist, the store fails, or
    /// the agent fails or answers without content. The user message stays
    /// persisted in that case.
    ///
    /// Summarization runs after the reply is persisted. If it fails, the
    /// failure is logged, the reply is still returned, and the history stays
    /// uncompacted until a later turn's check succeeds.
    #[instrument(skip(self, text, params), fields(text_len = text.len()))]
    pub async fn send_message(
        &self,
        session_id: SessionId,
        user_id: &str,
        text: &str,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<String, Report<OrchestratorError>> {
        let (session, request) = self.prepare_turn(session_id, user_id, text, params).await?;

        let response = with_deadline(self.config.request_timeout(), self.rpc.chat(request))
            .await?
            .map_err(rpc_error)?;
        if response.is_error() {
            return Err(OrchestratorError::Upstream {
                reason: response.error,
            }
            .into());
        }
        let reply = response
            .content()
            .filter(|content| !content.is_empty())
            .ok_or(OrchestratorError::EmptyReply)?
            .to_string();

        self.finish_turn(session_id, &reply).await?;
        drop(session);
        Ok(reply)
    }

    /// Sends a user message and streams the assistant reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the turn cannot be prepared or the stream cannot
    /// be opened. Failures after that arrive as [`StreamEvent::Error`].
    #[instrument(skip(self, text, params), fields(text_len = text.len()))]
    pub async fn send_message_stream(
        &self,
        session_id: SessionId,
        user_id: &str,
        text: &str,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<StreamHandle, Report<OrchestratorError>> {
        let (session, request) = self.prepare_turn(session_id, user_id, text, params).await?;
        let chunks = with_deadline(self.config.request_timeout(), self.rpc.chat_stream(request))
            .await?
            .map_err(rpc_error)?;

        let (tx, rx) = mpsc::channel(STREAM_EVENT_CAPACITY);
        let this = self.clone();
        let task = tokio::spawn(async move {
            // Held until the reply is persisted or the task is aborted.
            let _session = session;
            match this.relay_stream(chunks, &tx).await {
                Ok(content) => match this.finish_turn(session_id, &content).await {
                    Ok(message_id) => {
                        let _ = tx.send(StreamEvent::End { message_id, content }).await;
                    }
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.current_context().to_string())).await;
                    }
                },
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "streamed reply failed");
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                }
            }
        });

        Ok(StreamHandle::new(rx, task))
    }

    /// Folds older active turns into the session summary when the active
    /// history is over budget.
    ///
    /// Returns the new summary, or `None` when nothing needed folding.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn summarize_older_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Option<String>, Report<OrchestratorError>> {
        let context = self
            .store
            .conversation_context(session_id)
            .await
            .map_err(store_error)?;

        let total = self
            .budgeter
            .count_messages(context.messages.iter().map(|m| m.content.as_str()));
        if !self
            .budgeter
            .needs_compaction(total, self.config.summary_threshold_tokens)
        {
            return Ok(None);
        }
        let keep = self.config.keep_recent_messages;
        if context.messages.len() <= keep {
            return Ok(None);
        }

        let older = &context.messages[..context.messages.len() - keep];
        let turns: Vec<LlmMessage> = older
            .iter()
            .map(|m| LlmMessage::new(self.role_of(m), m.content.clone()))
            .collect();
        let summary = self
            .summarizer
            .summarize(context.summary.as_deref(), &turns);
        let summary = self
            .budgeter
            .truncate_to_fit(&summary, self.config.summary_max_tokens);
        let archived: Vec<MessageId> = older.iter().map(|m| m.id).collect();

        self.store
            .apply_summary(session_id, &summary, &archived)
            .await
            .map_err(store_error)?;
        info!(
            session_id = %session_id,
            archived = archived.len(),
            tokens = total,
            "summarized older messages"
        );
        Ok(Some(summary))
    }

    /// Builds the chat request for a session's current context.
    #[must_use]
    pub fn format_request(
        &self,
        session_id: SessionId,
        user_id: &str,
        context: &ConversationContext,
        tool_note: Option<&str>,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 2);
        if let Some(summary) = &context.summary {
            messages.push(ChatMessage::new(Role::System, summary.clone()));
        }
        for stored in &context.messages {
            let mut message = ChatMessage::new(wire_role(self.role_of(stored)), stored.content.clone());
            message.id = stored.id.to_string();
            message.session_id = session_id.to_string();
            message.timestamp = stored.created_at.timestamp_millis();
            messages.push(message);
        }
        if let Some(note) = tool_note {
            messages.push(ChatMessage::new(Role::System, note));
        }

        ChatRequest {
            messages,
            model: self.config.model.clone(),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            client_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    fn role_of(&self, message: &StoredMessage) -> LlmRole {
        match message.kind {
            MessageKind::System => LlmRole::System,
            MessageKind::Text if message.sender_id == self.config.assistant_id => {
                LlmRole::Assistant
            }
            MessageKind::Text => LlmRole::User,
        }
    }

    async fn prepare_turn(
        &self,
        session_id: SessionId,
        user_id: &str,
        text: &str,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<(SessionGuard, ChatRequest), Report<OrchestratorError>> {
        // Live state may have been swept while the history persists.
        self.store
            .conversation_context(session_id)
            .await
            .map_err(store_error)?;
        self.sessions
            .register_session(session_id, Some(user_id), None)
            .await;
        let mut session = self
            .sessions
            .lock_session(session_id, Some(user_id), None)
            .await
            .map_err(session_error)?;
        session.touch();

        self.store
            .save_message(session_id, text, user_id, MessageKind::Text, MessageStatus::Active)
            .await
            .map_err(store_error)?;

        let mut intent = self.recognizer.recognize_intent(text, &mut session.context);
        if let Some(params) = params {
            intent = intent.with_params(params);
        }
        debug!(session_id = %session_id, intent = intent.name(), "intent recognized");

        let tool_note = match intent.tool.as_deref() {
            Some(tool) => {
                let arguments = intent.arguments_json();
                Some(self.run_tool(session_id, user_id, tool, &arguments).await?)
            }
            None => None,
        };

        let context = self
            .store
            .conversation_context(session_id)
            .await
            .map_err(store_error)?;
        let request = self.format_request(session_id, user_id, &context, tool_note.as_deref());
        Ok((session, request))
    }

    async fn run_tool(
        &self,
        session_id: SessionId,
        user_id: &str,
        tool: &str,
        arguments: &str,
    ) -> Result<String, Report<OrchestratorError>> {
        let request = CallToolRequest {
            name: tool.to_string(),
            arguments: arguments.to_string(),
            client_id: user_id.to_string(),
            session_id: session_id.to_string(),
        };
        let response = with_deadline(self.config.request_timeout(), self.rpc.call_tool(request))
            .await?
            .map_err(rpc_error)?;
        let outcome = ToolOutcome::from(response);
        if outcome.is_error() {
            warn!(tool, error = %outcome.error, "tool call failed");
            Ok(outcome.error)
        } else {
            Ok(format!("Tool \"{tool}\" result: {}", outcome.content))
        }
    }

    async fn relay_stream(
        &self,
        mut chunks: ChatStream,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, OrchestratorError> {
        let mut text = String::new();
        loop {
            let Some(chunk) = with_deadline(self.config.request_timeout(), chunks.next()).await? else {
                break;
            };
            let response = chunk.map_err(|e| OrchestratorError::Rpc {
                reason: e.to_string(),
            })?;
            if response.is_error() {
                return Err(OrchestratorError::Upstream {
                    reason: response.error,
                });
            }
            let cumulative = response.content().unwrap_or_default();
            let delta = cumulative
                .strip_prefix(text.as_str())
                .ok_or(OrchestratorError::NonCumulativeChunk)?;
            if !delta.is_empty() && tx.send(StreamEvent::Data(delta.to_string())).await.is_err() {
                return Err(OrchestratorError::Rpc {
                    reason: "stream consumer went away".to_string(),
                });
            }
            text = cumulative.to_string();
        }

        if text.is_empty() {
            return Err(OrchestratorError::EmptyReply);
        }
        Ok(text)
    }

    /// Persists the reply, then runs the summarization check. A summarization
    /// failure skips compaction for this turn and is not returned.
    async fn finish_turn(
        &self,
        session_id: SessionId,
        reply: &str,
    ) -> Result<MessageId, Report<OrchestratorError>> {
        let message = self
            .store
            .save_message(
                session_id,
                reply,
                &self.config.assistant_id,
                MessageKind::Text,
                MessageStatus::Active,
            )
            .await
            .map_err(store_error)?;

        if let Err(e) = self.summarize_older_messages(session_id).await {
            warn!(session_id = %session_id, error = %e.current_context(), "summarization failed");
        }
        Ok(message.id)
    }
}
