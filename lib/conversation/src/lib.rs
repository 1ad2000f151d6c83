//! Conversation runtime for parley.
//!
//! This crate provides:
//!
//! - **Session Store**: chat session lifecycle, per-session serialization
//!   and the expiry sweep
//! - **Tool Registry**: the catalog of callable tools and the invoker that
//!   turns every failure into a signaled error
//! - **Intent Recognizer**: rule-based mapping from an utterance to a tool
//!   invocation, with entity extraction into the session context

pub mod builtin;
pub mod context;
pub mod error;
pub mod intent;
pub mod message;
pub mod session;
pub mod tool;

pub use builtin::builtin_registry;
pub use context::{CUSTOMER_ID, EntityExtractor, PROJECT_ID, SessionContext};
pub use error::{SessionError, ToolError};
pub use intent::{FALLBACK_REPLY, Intent, IntentRecognizer, NO_TOOL, reply_for_outcome};
pub use message::{ChatMessage, MessageRole};
pub use session::{ChatSession, SessionConfig, SessionGuard, SessionStore};
pub use tool::{FnTool, ToolDefinition, ToolHandler, ToolInvoker, ToolOutcome, ToolRegistry};
