//! Wire messages for the `parley.v1` package.
//!
//! Messages are declared directly with prost derives; the service stubs are
//! generated from them at build time.

use chrono::Utc;
use parley_ai::{LlmMessage, MessageRole as LlmRole};
use parley_conversation::{MessageRole, ToolDefinition, ToolOutcome};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tonic::Status;

/// Role of a wire message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Role {
    Unspecified = 0,
    System = 1,
    User = 2,
    Assistant = 3,
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::System => Self::System,
            MessageRole::User => Self::User,
            MessageRole::Assistant => Self::Assistant,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChatMessage {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(enumeration = "Role", tag = "3")]
    pub role: i32,
    #[prost(string, tag = "4")]
    pub content: String,
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "5")]
    pub timestamp: i64,
    #[prost(map = "string, string", tag = "6")]
    pub metadata: HashMap<String, String>,
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            session_id: String::new(),
            role: role as i32,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            metadata: HashMap::new(),
        }
    }

    /// Converts into the model's view of the message.
    ///
    /// # Errors
    ///
    /// Returns `invalid_argument` for unknown or unspecified roles.
    pub fn to_llm(&self) -> Result<LlmMessage, Status> {
        let role = match Role::try_from(self.role) {
            Ok(Role::System) => LlmRole::System,
            Ok(Role::User) => LlmRole::User,
            Ok(Role::Assistant) => LlmRole::Assistant,
            Ok(Role::Unspecified) | Err(_) => {
                return Err(Status::invalid_argument(format!(
                    "invalid message role: {}",
                    self.role
                )));
            }
        };
        Ok(LlmMessage::new(role, self.content.clone()))
    }
}

impl From<&parley_conversation::ChatMessage> for ChatMessage {
    fn from(message: &parley_conversation::ChatMessage) -> Self {
        Self {
            id: message.id.to_string(),
            session_id: message.session_id.to_string(),
            role: Role::from(message.role) as i32,
            content: message.content.clone(),
            timestamp: message.timestamp.timestamp_millis(),
            metadata: message
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChatRequest {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<ChatMessage>,
    #[prost(string, tag = "2")]
    pub model: String,
    #[prost(float, optional, tag = "3")]
    pub temperature: Option<f32>,
    #[prost(uint32, optional, tag = "4")]
    pub max_tokens: Option<u32>,
    #[prost(string, tag = "5")]
    pub client_id: String,
    #[prost(string, tag = "6")]
    pub session_id: String,
}

/// Reply to a chat request, or one cumulative chunk of a streamed reply.
///
/// Success carries `message` with an empty `error`; failure carries a
/// non-empty `error`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ChatResponse {
    #[prost(message, optional, tag = "1")]
    pub message: Option<ChatMessage>,
    #[prost(string, tag = "2")]
    pub error: String,
}

impl ChatResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn reply(message: ChatMessage) -> Self {
        Self {
            message: Some(message),
            error: String::new(),
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            message: None,
            error: error.into(),
        }
    }

    /// Returns whether the response signals an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// Returns the reply content, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.content.as_str())
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListToolsRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Tool {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub description: String,
    /// JSON schema, serialized.
    #[prost(string, tag = "3")]
    pub input_schema: String,
}

impl From<&ToolDefinition> for Tool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.to_string(),
        }
    }
}

impl From<Tool> for ToolDefinition {
    fn from(tool: Tool) -> Self {
        let schema: JsonValue = serde_json::from_str(&tool.input_schema).unwrap_or_default();
        ToolDefinition::new(tool.name, tool.description).with_input_schema(schema)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListToolsResponse {
    #[prost(message, repeated, tag = "1")]
    pub tools: Vec<Tool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CallToolRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    /// JSON-encoded arguments.
    #[prost(string, tag = "2")]
    pub arguments: String,
    #[prost(string, tag = "3")]
    pub client_id: String,
    #[prost(string, tag = "4")]
    pub session_id: String,
}

impl CallToolRequest {
    /// Creates a request for `name` with JSON `arguments`.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
            client_id: String::new(),
            session_id: String::new(),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CallToolResponse {
    #[prost(string, tag = "1")]
    pub content: String,
    #[prost(string, tag = "2")]
    pub error: String,
}

impl From<ToolOutcome> for CallToolResponse {
    fn from(outcome: ToolOutcome) -> Self {
        Self {
            content: outcome.content,
            error: outcome.error,
        }
    }
}

impl From<CallToolResponse> for ToolOutcome {
    fn from(response: CallToolResponse) -> Self {
        ToolOutcome {
            content: response.content,
            error: response.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::SessionId;

    #[test]
    fn role_mapping() {
        let message = ChatMessage::new(Role::Assistant, "hi");
        assert_eq!(message.to_llm().expect("role"), LlmMessage::assistant("hi"));
    }

    #[test]
    fn invalid_role_is_rejected() {
        let mut message = ChatMessage::new(Role::User, "hi");
        message.role = 42;
        let status = message.to_llm().expect_err("invalid");
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        message.role = Role::Unspecified as i32;
        assert!(message.to_llm().is_err());
    }

    #[test]
    fn domain_message_conversion() {
        let session_id = SessionId::new();
        let domain = parley_conversation::ChatMessage::user(session_id, "hello")
            .with_metadata("intent", "none");
        let wire = ChatMessage::from(&domain);

        assert_eq!(wire.session_id, session_id.to_string());
        assert_eq!(wire.role, Role::User as i32);
        assert_eq!(wire.metadata.get("intent").map(String::as_str), Some("none"));
        assert_eq!(wire.timestamp, domain.timestamp.timestamp_millis());
    }

    #[test]
    fn tool_schema_survives_the_wire() {
        let tool = ToolDefinition::new("echo", "Echo").with_input_schema(serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } }
        }));
        let back = ToolDefinition::from(Tool::from(&tool));
        assert_eq!(back, tool);
    }

    #[test]
    fn response_states() {
        assert!(ChatResponse::failure("boom").is_error());
        let ok = ChatResponse::reply(ChatMessage::new(Role::Assistant, ""));
        assert!(!ok.is_error());
        assert_eq!(ok.content(), Some(""));
    }
}
