//! Error types for the server.
//!
//! - `ServerError`: process startup and listener failures
//! - `ApiError`: gateway request failures, rendered as HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_orchestrator::OrchestratorError;
use rootcause::Report;
use std::fmt;

/// Errors that stop the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Configuration could not be loaded.
    Config { reason: String },
    /// A listener could not be bound.
    Bind { addr: String, reason: String },
    /// A component failed to start.
    Startup { component: &'static str, reason: String },
    /// A listener failed while serving.
    Serve { component: &'static str, reason: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Bind { addr, reason } => write!(f, "failed to bind {addr}: {reason}"),
            Self::Startup { component, reason } => {
                write!(f, "failed to start {component}: {reason}")
            }
            Self::Serve { component, reason } => write!(f, "{component} server error: {reason}"),
        }
    }
}

impl std::error::Error for ServerError {}

/// Errors returned by gateway handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A path parameter could not be parsed.
    InvalidId { id: String },
    /// The session does not exist.
    SessionNotFound,
    /// The agent or a collaborator failed.
    Upstream { reason: String },
    /// Unexpected internal failure.
    Internal { reason: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { id } => write!(f, "invalid session id '{id}'"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::Upstream { reason } => write!(f, "upstream failure: {reason}"),
            Self::Internal { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<Report<OrchestratorError>> for ApiError {
    fn from(report: Report<OrchestratorError>) -> Self {
        match report.current_context() {
            OrchestratorError::SessionNotFound { .. } => Self::SessionNotFound,
            OrchestratorError::Store { reason } => Self::Internal {
                reason: reason.clone(),
            },
            other => Self::Upstream {
                reason: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidId { .. } => (StatusCode::BAD_REQUEST, "Invalid session id"),
            Self::SessionNotFound => (StatusCode::NOT_FOUND, "Session not found"),
            Self::Upstream { reason } => {
                tracing::warn!(reason = %reason, "agent request failed");
                (StatusCode::BAD_GATEWAY, "Agent request failed")
            }
            Self::Internal { reason } => {
                tracing::error!(reason = %reason, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::SessionId;

    #[test]
    fn orchestrator_errors_map_to_api_errors() {
        let missing: Report<OrchestratorError> =
            OrchestratorError::SessionNotFound { id: SessionId::new() }.into();
        assert_eq!(ApiError::from(missing), ApiError::SessionNotFound);

        let empty: Report<OrchestratorError> = OrchestratorError::EmptyReply.into();
        assert!(matches!(ApiError::from(empty), ApiError::Upstream { .. }));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::SessionNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidId { id: "x".to_string() }.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
