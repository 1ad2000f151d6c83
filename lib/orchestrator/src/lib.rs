//! Conversation orchestration for parley.
//!
//! This crate provides:
//!
//! - **Message store**: durable history with summaries and archiving
//! - **Orchestrator**: runs each turn through the session store, intent
//!   recognition, tools and the agent RPC
//! - **Streams**: incremental delivery of assistant replies

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod stream;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, StoreError};
pub use orchestrator::Orchestrator;
pub use store::{
    ConversationContext, InMemoryMessageStore, MessageKind, MessageStatus, MessageStore,
    StoredMessage, StoredSession,
};
pub use stream::{StreamEvent, StreamHandle};
