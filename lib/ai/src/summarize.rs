//! Conversation summarization.
//!
//! When a session's history grows past its token threshold, the oldest
//! turns are folded into a rolling summary. The summarizer only produces
//! text; deciding which turns to fold is the orchestrator's job.

use crate::backend::LlmMessage;

/// Heading that opens every generated summary.
pub const SUMMARY_HEADING: &str = "Summary of earlier conversation:";

/// Condenses older turns into summary text.
pub trait Summarizer: Send + Sync {
    /// Folds `turns` into `previous`, returning the new summary.
    ///
    /// Must be deterministic: the same inputs always produce the same text.
    fn summarize(&self, previous: Option<&str>, turns: &[LlmMessage]) -> String;
}

/// Extractive summarizer that keeps the opening of each folded turn.
#[derive(Debug, Clone)]
pub struct HeuristicSummarizer {
    max_chars_per_turn: usize,
}

impl Default for HeuristicSummarizer {
    fn default() -> Self {
        Self::new(160)
    }
}

impl HeuristicSummarizer {
    /// Creates a summarizer keeping at most `max_chars_per_turn` characters
    /// of each folded turn.
    #[must_use]
    pub fn new(max_chars_per_turn: usize) -> Self {
        Self { max_chars_per_turn }
    }

    fn excerpt(&self, content: &str) -> String {
        let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
        match flat.char_indices().nth(self.max_chars_per_turn) {
            Some((idx, _)) => format!("{}...", &flat[..idx]),
            None => flat,
        }
    }
}

impl Summarizer for HeuristicSummarizer {
    fn summarize(&self, previous: Option<&str>, turns: &[LlmMessage]) -> String {
        let mut summary = match previous {
            Some(text) if !text.trim().is_empty() => text.trim_end().to_string(),
            _ => SUMMARY_HEADING.to_string(),
        };

        for turn in turns {
            summary.push_str("\n- ");
            summary.push_str(turn.role.as_str());
            summary.push_str(": ");
            summary.push_str(&self.excerpt(&turn.content));
        }

        summary
    }
}
