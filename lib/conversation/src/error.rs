//! Error types for the conversation crate.
//!
//! - `SessionError`: session lookup failures
//! - `ToolError`: tool lookup, argument and execution failures
//!
//! `ToolError` renders the exact strings carried in the `error` field of a
//! tool outcome, so callers can forward `to_string()` verbatim.

use parley_core::SessionId;
use std::fmt;

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session not found.
    NotFound { id: SessionId },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "session not found: {id}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from tool registration and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Arguments were not valid JSON or did not match the tool's shape.
    InvalidInput { name: String, reason: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Tool panicked while executing.
    Panicked { name: String },
    /// A tool with this name is already registered.
    DuplicateName { name: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "Tool \"{name}\" not found"),
            Self::InvalidInput { reason, .. } => write!(f, "Invalid args: {reason}"),
            Self::ExecutionFailed { name, reason } => write!(f, "Tool \"{name}\" failed: {reason}"),
            Self::Panicked { name } => write!(f, "Tool \"{name}\" panicked"),
            Self::DuplicateName { name } => write!(f, "Tool \"{name}\" is already registered"),
        }
    }
}

impl std::error::Error for ToolError {}
