//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables such as
//! `RPC__PORT=50051` or `SESSION__MAX_AGE_SECS=600`.

use parley_conversation::SessionConfig;
use parley_orchestrator::OrchestratorConfig;
use parley_rpc::RpcConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// gRPC listener.
    #[serde(default = "default_rpc_listen")]
    pub rpc: ListenConfig,

    /// HTTP gateway listener.
    #[serde(default = "default_http_listen")]
    pub http: ListenConfig,

    /// Model request settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Session store configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Token budget and summarization settings.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Streaming settings.
    #[serde(default)]
    pub stream: StreamConfig,
}

/// A listening address.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ListenConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_listen() -> ListenConfig {
    ListenConfig {
        host: default_host(),
        port: 50051,
    }
}

fn default_http_listen() -> ListenConfig {
    ListenConfig {
        host: default_host(),
        port: 8080,
    }
}

/// Model request settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier sent with each chat request.
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sender id used for assistant turns.
    pub assistant_id: String,
    /// Deadline for each agent call, zero for none.
    pub request_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            name: defaults.model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            assistant_id: defaults.assistant_id,
            request_timeout_ms: defaults.request_timeout_ms,
        }
    }
}

/// Token budget and summarization settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Subword tokenizer file; the character heuristic is used without one.
    pub tokenizer_path: Option<PathBuf>,
    pub summary_threshold_tokens: usize,
    pub keep_recent_messages: usize,
    pub summary_max_tokens: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            tokenizer_path: None,
            summary_threshold_tokens: defaults.summary_threshold_tokens,
            keep_recent_messages: defaults.keep_recent_messages,
            summary_max_tokens: defaults.summary_max_tokens,
        }
    }
}

/// Streaming settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Buffered chunks per stream.
    pub channel_capacity: usize,
    /// Pause between streamed chunks.
    pub chunk_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let defaults = RpcConfig::default();
        Self {
            channel_capacity: defaults.stream_channel_capacity,
            chunk_delay_ms: defaults.chunk_delay_ms,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the agent service configuration.
    #[must_use]
    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            default_model: self.model.name.clone(),
            stream_channel_capacity: self.stream.channel_capacity,
            chunk_delay_ms: self.stream.chunk_delay_ms,
        }
    }

    /// Returns the orchestrator configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            assistant_id: self.model.assistant_id.clone(),
            model: self.model.name.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            summary_threshold_tokens: self.budget.summary_threshold_tokens,
            keep_recent_messages: self.budget.keep_recent_messages,
            summary_max_tokens: self.budget.summary_max_tokens,
            request_timeout_ms: self.model.request_timeout_ms,
        }
    }
}
