//! Error types for the AI crate.
//!
//! - `LlmError`: failures of the model-completion collaborator
//! - `BudgetError`: failures loading or running the subword encoder

use std::fmt;

/// Errors from completion backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// The request carried no user message to answer.
    NoUserMessage,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUserMessage => write!(f, "no user message in request"),
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from the token budgeter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// The tokenizer file could not be loaded.
    TokenizerLoad { path: String, reason: String },
    /// The tokenizer failed to encode or decode text.
    Encoding { reason: String },
}

impl fmt::Display for BudgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenizerLoad { path, reason } => {
                write!(f, "failed to load tokenizer from '{path}': {reason}")
            }
            Self::Encoding { reason } => write!(f, "tokenizer encoding failed: {reason}"),
        }
    }
}

impl std::error::Error for BudgetError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_display() {
        assert_eq!(LlmError::NoUserMessage.to_string(), "no user message in request");
    }

    #[test]
    fn budget_error_display() {
        let err = BudgetError::TokenizerLoad {
            path: "/tmp/tokenizer.json".to_string(),
            reason: "missing".to_string(),
        };
        assert!(err.to_string().contains("/tmp/tokenizer.json"));
    }
}
