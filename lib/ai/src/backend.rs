//! Model-completion backend abstraction.
//!
//! The runtime never assumes a particular provider. A backend accepts the
//! formatted conversation plus sampling parameters and returns the reply
//! text, either whole or as a stream of deltas.

use crate::error::LlmError;
use crate::tokens::{HeuristicTokenCounter, TokenCounter};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a message sender as seen by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

impl MessageRole {
    /// Returns the lowercase role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in the context sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
}

impl LlmMessage {
    /// Creates a message with the given role.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// A completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full formatted context, oldest first.
    pub messages: Vec<LlmMessage>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request for the given model and context.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<LlmMessage>) -> Self {
        Self {
            messages,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Returns the most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&LlmMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }
}

/// A completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated content.
    pub content: String,
    /// Model that generated the response.
    pub model: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A stream of reply deltas. Concatenating every item yields the reply.
pub type DeltaStream = BoxStream<'static, Result<String, LlmError>>;

/// Trait for model-completion backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generates a complete reply for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Generates a reply as a stream of deltas.
    ///
    /// The default implementation completes the request and splits the
    /// reply at word boundaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails before streaming starts.
    async fn stream(&self, request: &CompletionRequest) -> Result<DeltaStream, LlmError> {
        let response = self.complete(request).await?;
        let chunks: Vec<Result<String, LlmError>> =
            word_chunks(&response.content).into_iter().map(Ok).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    /// Returns the provider name, used in logs.
    fn provider(&self) -> &str;
}

/// Splits text into word-granular chunks that concatenate back to the input.
///
/// Each chunk carries its trailing whitespace.
#[must_use]
pub fn word_chunks(text: &str) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    for piece in text.split_inclusive(char::is_whitespace) {
        // Runs of whitespace stay attached to the previous word.
        if piece.trim().is_empty() {
            if let Some(last) = chunks.last_mut() {
                last.push_str(piece);
                continue;
            }
        }
        chunks.push(piece.to_string());
    }
    chunks
}

/// Reference backend that echoes the last user message.
///
/// The reply is a deterministic function of the input, which makes it the
/// backend of choice for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    counter: HeuristicTokenCounter,
}

impl EchoBackend {
    /// Creates a new echo backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reply this backend produces for the given user text.
    #[must_use]
    pub fn reply_for(text: &str) -> String {
        format!("Echo: {text}")
    }
}

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let last = request.last_user_message().ok_or(LlmError::NoUserMessage)?;
        let content = Self::reply_for(&last.content);

        let input_tokens = request
            .messages
            .iter()
            .map(|m| self.counter.count(&m.content))
            .sum::<usize>();
        let usage = TokenUsage {
            input_tokens: u32::try_from(input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(self.counter.count(&content)).unwrap_or(u32::MAX),
        };

        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            usage,
        })
    }

    fn provider(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_user_message_skips_assistant_turns() {
        let request = CompletionRequest::new(
            "test",
            vec![
                LlmMessage::system("summary"),
                LlmMessage::user("first"),
                LlmMessage::user("second"),
                LlmMessage::assistant("reply"),
            ],
        );
        assert_eq!(request.last_user_message().unwrap().content, "second");
    }

    #[test]
    fn word_chunks_concatenate_to_input() {
        let text = "Echo: Hello  wide\nworld";
        let chunks = word_chunks(text);
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks[0], "Echo: ");
        assert_eq!(chunks.last().unwrap(), "world");
    }

    #[test]
    fn word_chunks_of_empty_text() {
        assert!(word_chunks("").is_empty());
    }

    #[tokio::test]
    async fn echo_backend_replies_with_user_text() {
        let backend = EchoBackend::new();
        let request = CompletionRequest::new("test", vec![LlmMessage::user("Hello")]);

        let response = backend.complete(&request).await.expect("complete");

        assert_eq!(response.content, "Echo: Hello");
        assert_eq!(response.model, "test");
        assert!(response.usage.total() > 0);
    }

    #[tokio::test]
    async fn echo_backend_rejects_context_without_user() {
        let backend = EchoBackend::new();
        let request = CompletionRequest::new("test", vec![LlmMessage::system("only system")]);

        let err = backend.complete(&request).await.unwrap_err();
        assert_eq!(err, LlmError::NoUserMessage);
    }

    #[tokio::test]
    async fn default_stream_matches_completion() {
        let backend = EchoBackend::new();
        let request = CompletionRequest::new("test", vec![LlmMessage::user("one two three")]);

        let deltas: Vec<String> = backend
            .stream(&request)
            .await
            .expect("stream")
            .map(|d| d.expect("delta"))
            .collect()
            .await;

        assert!(deltas.len() > 1);
        assert_eq!(deltas.concat(), "Echo: one two three");
    }
}
