//! parley server.
//!
//! Runs the `AgentRpc` gRPC service and an HTTP gateway that drives the
//! orchestrator against it.

pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
