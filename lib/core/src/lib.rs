//! Core types shared by every parley crate.
//!
//! This crate provides the typed identifiers for sessions and messages and
//! the rootcause-backed `Result` alias used across the session runtime.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{MessageId, ParseIdError, SessionId};
