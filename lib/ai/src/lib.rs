//! Language-model primitives for parley.
//!
//! This crate provides:
//!
//! - **Completion backend**: the model-completion collaborator interface and
//!   the deterministic echo backend used for reference behavior
//! - **Token budgeter**: token counting and truncation with a subword
//!   encoder and a character-based fallback
//! - **Summarizer**: condenses older turns into a rolling summary

pub mod backend;
pub mod error;
pub mod summarize;
pub mod tokens;

pub use backend::{
    CompletionBackend, CompletionRequest, CompletionResponse, DeltaStream, EchoBackend,
    LlmMessage, MessageRole, TokenUsage, word_chunks,
};
pub use error::{BudgetError, LlmError};
pub use summarize::{HeuristicSummarizer, Summarizer};
pub use tokens::{HeuristicTokenCounter, SubwordTokenCounter, TokenBudgeter, TokenCounter};
