//! HTTP gateway over the orchestrator.

use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use parley_conversation::{ChatMessage, SessionStore};
use parley_core::SessionId;
use parley_orchestrator::{Orchestrator, StoredMessage, StoredSession, StreamEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state of the gateway handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionStore>,
}

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", delete(delete_session))
        .route("/sessions/{id}/messages", get(list_messages).post(send_message))
        .route("/sessions/{id}/messages/stream", post(stream_message))
        .route("/sessions/{id}/turns", post(process_turn))
        .route("/users/{user_id}/sessions", get(user_sessions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_id(id: &str) -> Result<SessionId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::InvalidId { id: id.to_string() })
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub params: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Reply {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct TurnBody {
    pub text: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

async fn health() -> &'static str {
    "ok"
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state
        .orchestrator
        .create_session(&body.user_id, body.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedSession { session_id })))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if state.orchestrator.delete_session(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound)
    }
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.orchestrator.session_messages(id).await?))
}

async fn user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<StoredSession>>, ApiError> {
    Ok(Json(state.orchestrator.user_sessions(&user_id).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<Reply>, ApiError> {
    let id = parse_id(&id)?;
    let reply = state
        .orchestrator
        .send_message(id, &body.user_id, &body.text, body.params.as_ref())
        .await?;
    Ok(Json(Reply { reply }))
}

fn sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Data(delta) => Event::default().event("data").data(delta),
        StreamEvent::End {
            message_id,
            content,
        } => Event::default().event("end").data(
            serde_json::json!({ "message_id": message_id.to_string(), "content": content })
                .to_string(),
        ),
        StreamEvent::Error(reason) => Event::default().event("error").data(reason),
    }
}

async fn stream_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_id(&id)?;
    let handle = state
        .orchestrator
        .send_message_stream(id, &body.user_id, &body.text, body.params.as_ref())
        .await?;
    Ok(Sse::new(handle.map(|event| Ok(sse_event(event)))).keep_alive(KeepAlive::default()))
}

async fn process_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TurnBody>,
) -> Result<Json<ChatMessage>, ApiError> {
    let id = parse_id(&id)?;
    let message = state
        .sessions
        .process_turn(id, &body.text, body.user_id.as_deref(), body.project_id.as_deref())
        .await
        .map_err(|_| ApiError::SessionNotFound)?;
    Ok(Json(message))
}
