//! gRPC protocol layer for parley.
//!
//! This crate provides:
//!
//! - **Wire messages** for the `parley.v1` package
//! - **`AgentService`**: the `AgentRpc` service over a completion backend
//!   and a tool invoker
//! - **`RpcClient`**: a client for a remote service
//! - **`ChatRpc`**: the trait both of the above implement

pub mod client;
pub mod error;
pub mod proto;
pub mod service;

/// Service stubs generated at build time.
pub mod generated {
    #![allow(clippy::all, missing_docs)]
    include!(concat!(env!("OUT_DIR"), "/parley.v1.AgentRpc.rs"));
}

pub use client::{ChatRpc, ChatStream, RpcClient};
pub use error::RpcError;
pub use generated::agent_rpc_server::AgentRpcServer;
pub use service::{AgentService, RpcConfig};
