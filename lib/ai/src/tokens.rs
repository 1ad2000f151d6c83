//! Token counting and truncation.
//!
//! Counting prefers a subword encoder loaded from a HuggingFace
//! `tokenizer.json`. When none is configured, or the encoder fails on a
//! particular input, the budgeter falls back to `ceil(chars / 4)`.
//!
//! Every counter upholds the truncation invariant: for any text `t` and
//! limit `l`, `count(truncate(t, l)) <= l`, and the truncated text is a
//! prefix of `t`.

use crate::error::BudgetError;
use rootcause::Report;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// Characters per token assumed by the fallback estimate.
const CHARS_PER_TOKEN: usize = 4;

/// Counts and truncates text in model tokens.
pub trait TokenCounter: Send + Sync {
    /// Returns the number of tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// Returns the longest prefix of `text` whose count is at most `limit`.
    fn truncate(&self, text: &str, limit: usize) -> String;
}

/// Character-based estimate: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    fn truncate(&self, text: &str, limit: usize) -> String {
        let max_chars = limit.saturating_mul(CHARS_PER_TOKEN);
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => text[..byte_idx].to_string(),
            None => text.to_string(),
        }
    }
}

/// Counter backed by a subword tokenizer.
pub struct SubwordTokenCounter {
    tokenizer: Tokenizer,
    fallback: HeuristicTokenCounter,
}

impl SubwordTokenCounter {
    /// Loads a tokenizer from a `tokenizer.json` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or is not a valid tokenizer.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Report<BudgetError>> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| BudgetError::TokenizerLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_tokenizer(tokenizer))
    }

    /// Wraps an already constructed tokenizer.
    #[must_use]
    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            fallback: HeuristicTokenCounter,
        }
    }

    fn encode(&self, text: &str) -> Result<tokenizers::Encoding, BudgetError> {
        self.tokenizer
            .encode(text, false)
            .map_err(|e| BudgetError::Encoding {
                reason: e.to_string(),
            })
    }
}

impl TokenCounter for SubwordTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.encode(text) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                debug!(error = %e, "subword count failed, using estimate");
                self.fallback.count(text)
            }
        }
    }

    fn truncate(&self, text: &str, limit: usize) -> String {
        let encoding = match self.encode(text) {
            Ok(encoding) => encoding,
            Err(e) => {
                debug!(error = %e, "subword truncate failed, using estimate");
                return self.fallback.truncate(text, limit);
            }
        };

        if encoding.len() <= limit {
            return text.to_string();
        }

        // Offsets are byte ranges into `text`. Cut after the last kept token
        // and re-count, since merges at the cut can change the tally.
        let offsets = encoding.get_offsets();
        let mut keep = limit;
        while keep > 0 {
            let end = offsets[keep - 1].1;
            if text.is_char_boundary(end) {
                let candidate = &text[..end];
                if self.count(candidate) <= limit {
                    return candidate.to_string();
                }
            }
            keep -= 1;
        }
        String::new()
    }
}

/// Token budget operations used by the orchestrator.
#[derive(Clone)]
pub struct TokenBudgeter {
    counter: Arc<dyn TokenCounter>,
}

impl fmt::Debug for TokenBudgeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBudgeter").finish_non_exhaustive()
    }
}

impl Default for TokenBudgeter {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl TokenBudgeter {
    /// Creates a budgeter over the given counter.
    #[must_use]
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Creates a budgeter using the character-based estimate.
    #[must_use]
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicTokenCounter))
    }

    /// Creates a budgeter from an optional tokenizer path.
    ///
    /// A missing path or a tokenizer that fails to load selects the
    /// character-based estimate.
    #[must_use]
    pub fn from_tokenizer_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::heuristic();
        };

        match SubwordTokenCounter::from_file(path) {
            Ok(counter) => {
                info!(path = %path.display(), "loaded subword tokenizer");
                Self::new(Arc::new(counter))
            }
            Err(e) => {
                warn!(error = %e, "falling back to estimated token counts");
                Self::heuristic()
            }
        }
    }

    /// Returns the number of tokens in `text`.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Returns whether `text` is over `limit` tokens.
    #[must_use]
    pub fn exceeds_limit(&self, text: &str, limit: usize) -> bool {
        self.count_tokens(text) > limit
    }

    /// Truncates `text` so that it fits in `limit` tokens.
    #[must_use]
    pub fn truncate_to_fit(&self, text: &str, limit: usize) -> String {
        self.counter.truncate(text, limit)
    }

    /// Returns the combined token count of several texts.
    pub fn count_messages<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> usize {
        texts.into_iter().map(|t| self.count_tokens(t)).sum()
    }

    /// Returns whether a history of `total` tokens must be compacted.
    #[must_use]
    pub fn needs_compaction(&self, total: usize, threshold: usize) -> bool {
        total > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLES: &[&str] = &[
        "",
        "a",
        "abcd",
        "abcde",
        "Hello, world! This is a longer sentence used for budgeting.",
        "héllo wörld ünïcode ✓✓✓ 日本語のテキスト",
        "   leading and trailing   ",
    ];

    fn tiny_tokenizer_file() -> tempfile::NamedTempFile {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": { "[UNK]": 0, "hello": 1, "world": 2 },
                "unk_token": "[UNK]"
            }
        });
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(json.to_string().as_bytes()).expect("write tokenizer");
        file
    }

    #[test]
    fn heuristic_count_rounds_up() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abc"), 1);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count("日本語の"), 1);
    }

    #[test]
    fn heuristic_truncation_invariant() {
        let budgeter = TokenBudgeter::heuristic();
        for text in SAMPLES {
            for limit in 0..20 {
                let truncated = budgeter.truncate_to_fit(text, limit);
                assert!(budgeter.count_tokens(&truncated) <= limit);
                assert!(text.starts_with(&truncated));
            }
        }
    }

    #[test]
    fn truncation_keeps_text_that_fits() {
        let budgeter = TokenBudgeter::heuristic();
        assert_eq!(budgeter.truncate_to_fit("short", 10), "short");
        assert_eq!(budgeter.truncate_to_fit("abcdefgh", 1), "abcd");
    }

    #[test]
    fn exceeds_limit_is_strict() {
        let budgeter = TokenBudgeter::heuristic();
        assert!(!budgeter.exceeds_limit("abcd", 1));
        assert!(budgeter.exceeds_limit("abcde", 1));
    }

    #[test]
    fn count_messages_sums_parts() {
        let budgeter = TokenBudgeter::heuristic();
        assert_eq!(budgeter.count_messages(["abcd", "abcde", ""]), 3);
        assert!(budgeter.needs_compaction(3, 2));
        assert!(!budgeter.needs_compaction(2, 2));
    }

    #[test]
    fn subword_counter_counts_words() {
        let file = tiny_tokenizer_file();
        let counter = SubwordTokenCounter::from_file(file.path()).expect("load tokenizer");

        assert_eq!(counter.count("hello world"), 2);
        assert_eq!(counter.count("hello world unknown"), 3);
    }

    #[test]
    fn subword_truncation_invariant() {
        let file = tiny_tokenizer_file();
        let budgeter = TokenBudgeter::from_tokenizer_path(Some(file.path()));

        let text = "hello world hello again world";
        assert_eq!(budgeter.truncate_to_fit(text, 2), "hello world");
        for limit in 0..8 {
            let truncated = budgeter.truncate_to_fit(text, limit);
            assert!(budgeter.count_tokens(&truncated) <= limit);
            assert!(text.starts_with(&truncated));
        }
    }

    #[test]
    fn missing_tokenizer_is_an_error() {
        let result = SubwordTokenCounter::from_file("/nonexistent/tokenizer.json");
        assert!(result.is_err());
    }

    #[test]
    fn missing_tokenizer_falls_back_to_estimate() {
        let budgeter =
            TokenBudgeter::from_tokenizer_path(Some(Path::new("/nonexistent/tokenizer.json")));
        assert_eq!(budgeter.count_tokens("abcde"), 2);
    }
}
