//! Error types for the orchestrator crate.
//!
//! - `StoreError`: message persistence failures
//! - `OrchestratorError`: failures surfaced to orchestrator callers

use parley_core::SessionId;
use std::fmt;

/// Errors from message store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Session not found.
    SessionNotFound { id: SessionId },
    /// Backend storage failure.
    Storage { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound { id } => write!(f, "session not found: {id}"),
            Self::Storage { reason } => write!(f, "message store failure: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The session does not exist.
    SessionNotFound { id: SessionId },
    /// The message store failed.
    Store { reason: String },
    /// The RPC call failed at the transport or protocol level.
    Rpc { reason: String },
    /// The agent answered with an application error.
    Upstream { reason: String },
    /// The agent answered without content.
    EmptyReply,
    /// A streamed chunk did not extend the text received so far.
    NonCumulativeChunk,
    /// The RPC call did not finish in time.
    Timeout { after_ms: u64 },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound { id } => write!(f, "session not found: {id}"),
            Self::Store { reason } => write!(f, "message store failure: {reason}"),
            Self::Rpc { reason } => write!(f, "agent call failed: {reason}"),
            Self::Upstream { reason } => write!(f, "agent error: {reason}"),
            Self::EmptyReply => write!(f, "agent returned an empty reply"),
            Self::NonCumulativeChunk => {
                write!(f, "streamed chunk does not extend the previous text")
            }
            Self::Timeout { after_ms } => write!(f, "agent call timed out after {after_ms}ms"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<&StoreError> for OrchestratorError {
    fn from(error: &StoreError) -> Self {
        match error {
            StoreError::SessionNotFound { id } => Self::SessionNotFound { id: *id },
            StoreError::Storage { .. } => Self::Store {
                reason: error.to_string(),
            },
        }
    }
}
