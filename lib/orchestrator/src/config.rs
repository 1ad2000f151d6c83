//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Sender id of assistant turns.
    pub assistant_id: String,
    /// Model requested from the agent.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate per reply.
    pub max_tokens: u32,
    /// Active-history size above which older turns are summarized.
    pub summary_threshold_tokens: usize,
    /// Turns kept verbatim when summarizing.
    pub keep_recent_messages: usize,
    /// Upper bound on the summary size.
    pub summary_max_tokens: usize,
    /// Per-call deadline for agent RPCs, zero for none.
    pub request_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            assistant_id: "assistant".to_string(),
            model: "echo".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            summary_threshold_tokens: 3000,
            keep_recent_messages: 6,
            summary_max_tokens: 512,
            request_timeout_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    /// Returns the RPC deadline, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}
