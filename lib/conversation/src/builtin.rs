//! Built-in tools.
//!
//! Each tool deserializes its own typed argument struct; the registry only
//! guarantees the arguments are valid JSON.

use crate::error::ToolError;
use crate::tool::{ToolDefinition, ToolHandler, ToolRegistry, typed_args};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// Arguments for [`EchoTool`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EchoArgs {
    /// Text to echo back.
    #[serde(default)]
    pub text: String,
}

/// Arguments for [`CreateVoucherTool`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherArgs {
    /// Project the voucher is issued for.
    pub project_id: String,
    /// Customer receiving the voucher.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Free-form note attached to the voucher.
    #[serde(default)]
    pub note: Option<String>,
}

/// Arguments for [`GetProjectTool`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectArgs {
    /// Project to look up.
    pub project_id: String,
}

/// Arguments for [`GetCustomerTool`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerArgs {
    /// Customer to look up.
    pub customer_id: String,
}

/// A voucher issued by [`CreateVoucherTool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    /// Voucher code.
    pub code: String,
    /// Project the voucher belongs to.
    pub project_id: String,
    /// Customer the voucher was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Attached note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Lifecycle status.
    pub status: String,
}

fn to_json<T: Serialize>(tool: &str, value: &T) -> Result<JsonValue, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed {
        name: tool.to_string(),
        reason: e.to_string(),
    })
}

fn require_non_empty(tool: &str, field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidInput {
            name: tool.to_string(),
            reason: format!("`{field}` must not be empty"),
        });
    }
    Ok(())
}

/// Returns the text it was given.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

impl ToolHandler for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Repeat the provided text back to the caller").with_input_schema(
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } }
            }),
        )
    }

    fn call(&self, arguments: JsonValue) -> Result<JsonValue, ToolError> {
        let args: EchoArgs = typed_args("echo", arguments)?;
        Ok(serde_json::json!({ "echo": args.text }))
    }
}

/// Issues a voucher for a project.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateVoucherTool;

impl ToolHandler for CreateVoucherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "create_voucher",
            "Create a discount voucher for a project, optionally for a customer",
        )
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "string" },
                "customerId": { "type": "string" },
                "note": { "type": "string" }
            },
            "required": ["projectId"]
        }))
    }

    fn call(&self, arguments: JsonValue) -> Result<JsonValue, ToolError> {
        let args: VoucherArgs = typed_args("create_voucher", arguments)?;
        require_non_empty("create_voucher", "projectId", &args.project_id)?;

        let voucher = Voucher {
            code: format!("VCH-{}", Ulid::new()),
            project_id: args.project_id,
            customer_id: args.customer_id,
            note: args.note,
            status: "created".to_string(),
        };
        to_json("create_voucher", &voucher)
    }
}

/// Looks up a project.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetProjectTool;

impl ToolHandler for GetProjectTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("get_project", "Look up the details and status of a project")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": { "projectId": { "type": "string" } },
                "required": ["projectId"]
            }))
    }

    fn call(&self, arguments: JsonValue) -> Result<JsonValue, ToolError> {
        let args: ProjectArgs = typed_args("get_project", arguments)?;
        require_non_empty("get_project", "projectId", &args.project_id)?;
        Ok(serde_json::json!({
            "projectId": args.project_id,
            "status": "active"
        }))
    }
}

/// Looks up a customer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCustomerTool;

impl ToolHandler for GetCustomerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("get_customer", "Look up the account of a customer").with_input_schema(
            serde_json::json!({
                "type": "object",
                "properties": { "customerId": { "type": "string" } },
                "required": ["customerId"]
            }),
        )
    }

    fn call(&self, arguments: JsonValue) -> Result<JsonValue, ToolError> {
        let args: CustomerArgs = typed_args("get_customer", arguments)?;
        require_non_empty("get_customer", "customerId", &args.customer_id)?;
        Ok(serde_json::json!({
            "customerId": args.customer_id,
            "status": "active"
        }))
    }
}

/// Returns a registry holding every built-in tool.
///
/// # Errors
///
/// Returns an error only if two built-ins share a name.
pub fn builtin_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool)?;
    registry.register(CreateVoucherTool)?;
    registry.register(GetProjectTool)?;
    registry.register(GetCustomerTool)?;
    Ok(registry)
}
