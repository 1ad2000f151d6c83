//! Tool registry and invoker.
//!
//! Tools are capabilities the assistant can execute on behalf of a user.
//! The registry is populated at startup and read concurrently afterwards.
//! Invocation never fails across this boundary: unknown names, malformed
//! arguments, handler errors and handler panics all come back as a
//! [`ToolOutcome`] carrying a non-empty `error`.

use crate::error::ToolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Definition of a tool available during conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for input parameters.
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Creates a new tool definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }

    /// Returns the property names declared by the input schema.
    #[must_use]
    pub fn schema_properties(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Result of a tool invocation.
///
/// Exactly one of the two states holds: success (`error` empty, `content`
/// holds the JSON result, possibly empty) or failure (`error` non-empty,
/// `content` empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// JSON-serialized result.
    pub content: String,
    /// Failure description, empty on success.
    pub error: String,
}

impl ToolOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: String::new(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(error: &ToolError) -> Self {
        Self {
            content: String::new(),
            error: error.to_string(),
        }
    }

    /// Returns whether the invocation failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// A tool implementation.
///
/// Handlers run on the caller's task and are expected to be fast and
/// CPU-bound.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with already-parsed JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are unusable or execution fails.
    fn call(&self, arguments: JsonValue) -> Result<JsonValue, ToolError>;
}

/// Deserializes `arguments` into a tool's typed argument shape.
///
/// # Errors
///
/// Returns `ToolError::InvalidInput` if the value does not match `T`.
pub fn typed_args<T: DeserializeOwned>(tool: &str, arguments: JsonValue) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidInput {
        name: tool.to_string(),
        reason: e.to_string(),
    })
}

type DynamicCall = dyn Fn(JsonValue) -> Result<JsonValue, ToolError> + Send + Sync;

/// A tool with untyped JSON arguments, backed by a closure.
pub struct FnTool {
    definition: ToolDefinition,
    call: Box<DynamicCall>,
}

impl FnTool {
    /// Creates a tool from a definition and a handler closure.
    pub fn new<F>(definition: ToolDefinition, call: F) -> Self
    where
        F: Fn(JsonValue) -> Result<JsonValue, ToolError> + Send + Sync + 'static,
    {
        Self {
            definition,
            call: Box::new(call),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

impl ToolHandler for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn call(&self, arguments: JsonValue) -> Result<JsonValue, ToolError> {
        (self.call)(arguments)
    }
}

/// Something that can list and invoke tools.
pub trait ToolInvoker: Send + Sync {
    /// Returns the catalog in registration order.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Invokes `name` with JSON-encoded `arguments`.
    fn call_tool(&self, name: &str, arguments: &str) -> ToolOutcome;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
    definitions: Vec<ToolDefinition>,
    by_name: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::DuplicateName` if the name is taken.
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> Result<(), ToolError> {
        let definition = handler.definition();
        if self.by_name.contains_key(&definition.name) {
            return Err(ToolError::DuplicateName {
                name: definition.name,
            });
        }

        self.by_name
            .insert(definition.name.clone(), self.handlers.len());
        self.definitions.push(definition);
        self.handlers.push(Arc::new(handler));
        Ok(())
    }

    /// Gets a tool definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|&idx| &self.definitions[idx])
    }

    /// Returns all definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn invoke(&self, name: &str, arguments: &str) -> Result<JsonValue, ToolError> {
        let handler = self
            .by_name
            .get(name)
            .map(|&idx| &self.handlers[idx])
            .ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
            })?;

        let arguments: JsonValue =
            serde_json::from_str(arguments).map_err(|e| ToolError::InvalidInput {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        catch_unwind(AssertUnwindSafe(|| handler.call(arguments))).map_err(|_| {
            ToolError::Panicked {
                name: name.to_string(),
            }
        })?
    }
}

impl ToolInvoker for ToolRegistry {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    fn call_tool(&self, name: &str, arguments: &str) -> ToolOutcome {
        match self.invoke(name, arguments) {
            Ok(result) => {
                debug!(tool = name, "tool call succeeded");
                ToolOutcome::success(result.to_string())
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolOutcome::failure(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> FnTool {
        FnTool::new(
            ToolDefinition::new("echo", "Echo the arguments"),
            Ok,
        )
    }

    #[test]
    fn tool_definition_builder() {
        let tool = ToolDefinition::new("search", "Search things").with_input_schema(
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" }, "limit": { "type": "integer" } }
            }),
        );

        let mut props = tool.schema_properties();
        props.sort_unstable();
        assert_eq!(props, vec!["limit", "query"]);
    }

    #[test]
    fn registry_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(FnTool::new(ToolDefinition::new(name, "test"), Ok))
                .expect("register");
        }

        let names: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).expect("first");
        let err = registry.register(echo_tool()).unwrap_err();
        assert_eq!(
            err,
            ToolError::DuplicateName {
                name: "echo".to_string()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_tool_is_signaled() {
        let registry = ToolRegistry::new();
        let outcome = registry.call_tool("nonexistent", "{}");
        assert_eq!(outcome.content, "");
        assert_eq!(outcome.error, "Tool \"nonexistent\" not found");
    }

    #[test]
    fn malformed_arguments_are_signaled() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).expect("register");

        let outcome = registry.call_tool("echo", "{not json");
        assert!(outcome.is_error());
        assert!(outcome.error.starts_with("Invalid args: "));
        assert_eq!(outcome.content, "");
    }

    #[test]
    fn success_serializes_result() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).expect("register");

        let outcome = registry.call_tool("echo", r#"{"a":1}"#);
        assert!(!outcome.is_error());
        assert_eq!(outcome.content, r#"{"a":1}"#);
    }

    #[test]
    fn handler_errors_become_outcomes() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FnTool::new(ToolDefinition::new("fail", "Always fails"), |_| {
                Err(ToolError::ExecutionFailed {
                    name: "fail".to_string(),
                    reason: "backend down".to_string(),
                })
            }))
            .expect("register");

        let outcome = registry.call_tool("fail", "{}");
        assert_eq!(outcome.error, "Tool \"fail\" failed: backend down");
    }

    #[test]
    fn handler_panics_are_caught() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FnTool::new(
                ToolDefinition::new("explode", "Panics"),
                |_| panic!("kaboom"),
            ))
            .expect("register");

        let outcome = registry.call_tool("explode", "{}");
        assert_eq!(outcome.error, "Tool \"explode\" panicked");
        assert_eq!(outcome.content, "");
    }

    #[test]
    fn typed_args_reports_shape_errors() {
        #[derive(Debug, Deserialize)]
        struct Args {
            #[allow(dead_code)]
            count: u32,
        }

        let err = typed_args::<Args>("counter", serde_json::json!({"count": "x"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }
}
