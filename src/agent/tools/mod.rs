//! Tool definitions and registry for the agent loop.
//!
//! A `Tool` pairs a declaration the model can see (name, description,
//! parameter schema, optional response schema) with an async implementation
//! the loop can dispatch to. The registry validates model-supplied
//! arguments against the parameter schema before any implementation runs,
//! and turns unknown tool names into a typed, recoverable error.

pub mod explore;
pub mod sandbox;

pub use explore::{ListDirectoryTool, ReadFileTool};
pub use sandbox::{BuildImageTool, CreateContainerTool, ExecuteCommandTool};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during tool dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Model-supplied arguments failed schema validation.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The requested tool name is not in this agent's tool set.
    #[error("Tool not available: {0}")]
    NotAvailable(String),
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// A tool invocation requested by the model. Several may arrive in one
/// model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
}

/// Outcome tag of a dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    Success,
    Error,
}

/// One dispatched call with its result or error, in call order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outcome: CallOutcome,
}

impl ToolCallRecord {
    pub fn success(call: &ToolCallRequest, result: Value) -> Self {
        Self {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: Some(result),
            error: None,
            outcome: CallOutcome::Success,
        }
    }

    pub fn failure(call: &ToolCallRequest, message: impl Into<String>) -> Self {
        Self {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: None,
            error: Some(message.into()),
            outcome: CallOutcome::Error,
        }
    }
}

/// Trait for tools the agent loop can dispatch to.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within one agent's tool set.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    /// Optional JSON schema of the produced result.
    fn response_schema(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError>;
}

/// Registry mapping tool names to implementations.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The complete declaration set to advertise to the model.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations: Vec<ToolDeclaration> = self
            .tools
            .values()
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
                response: tool.response_schema(),
            })
            .collect();
        // HashMap iteration order is arbitrary; keep the advertised set stable.
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    /// Look up and invoke a tool, validating arguments first.
    ///
    /// An unknown name or malformed arguments yield a `ToolError`, never a
    /// panic; the loop folds either into conversation history.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotAvailable(format!("Tool '{name}' not found")))?;
        validate_arguments(&tool.parameters_schema(), &args)?;
        tool.execute(args).await
    }
}

/// Check model-supplied arguments against a tool's parameter schema.
///
/// Structural only: the arguments must be an object, every `required`
/// property must be present, and properties with a declared primitive type
/// must match it. Unknown extra properties are tolerated.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let Some(object) = args.as_object() else {
        return Err(ToolError::InvalidParameters(
            "arguments must be a JSON object".to_string(),
        ));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                return Err(ToolError::InvalidParameters(format!(
                    "missing required parameter '{name}'"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in object {
            let Some(expected) = properties
                .get(key)
                .and_then(|prop| prop.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(ToolError::InvalidParameters(format!(
                    "parameter '{key}' must be of type {expected}"
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// The designated finalize tool: declared to the model, intercepted by name
/// in the loop, never actually executed.
pub struct FinalizeTool {
    name: String,
    description: String,
    parameters: Value,
}

impl FinalizeTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[async_trait]
impl Tool for FinalizeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::success(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the given text back."
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo." }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(ToolResult::success(text))
        }
    }

    #[tokio::test]
    async fn dispatch_invokes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let result = registry
            .dispatch("echo", json!({"text": "hi"}))
            .await
            .expect("dispatch");
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[tokio::test]
    async fn dispatch_on_unknown_name_is_typed_error() {
        let registry = ToolRegistry::new();
        let err = registry
            .dispatch("nonexistent", json!({}))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ToolError::NotAvailable(_)));
        assert!(err.to_string().contains("'nonexistent'"));
    }

    #[tokio::test]
    async fn dispatch_rejects_missing_required_parameter() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let err = registry
            .dispatch("echo", json!({}))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ToolError::InvalidParameters(_)));
        assert!(err.to_string().contains("'text'"));
    }

    #[tokio::test]
    async fn dispatch_rejects_wrong_parameter_type() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let err = registry
            .dispatch("echo", json!({"text": 42}))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[test]
    fn validate_arguments_rejects_non_object() {
        let schema = json!({"type": "object"});
        assert!(validate_arguments(&schema, &json!("not an object")).is_err());
        assert!(validate_arguments(&schema, &json!({})).is_ok());
    }

    #[test]
    fn validate_arguments_tolerates_extra_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        });
        let args = json!({"path": "src", "verbose": true});
        assert!(validate_arguments(&schema, &args).is_ok());
    }

    #[test]
    fn declarations_are_sorted_and_complete() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FinalizeTool::new(
            "all_done",
            "Signal completion.",
            json!({"type": "object"}),
        )));

        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].name, "all_done");
        assert_eq!(declarations[1].name, "echo");
    }

    #[tokio::test]
    async fn finalize_tool_execution_is_a_noop() {
        let tool = FinalizeTool::new("all_done", "Signal completion.", json!({"type": "object"}));
        let result = tool.execute(json!({})).await.expect("noop");
        assert!(result.success);
        assert!(result.output.is_empty());
    }

    #[test]
    fn call_records_serialize_camel_case() {
        let call = ToolCallRequest {
            name: "read_file".to_string(),
            arguments: json!({"path": "src/lib.rs"}),
        };
        let record = ToolCallRecord::failure(&call, "File not found: src/lib.rs");
        let value = serde_json::to_value(&record).expect("serialize");

        assert_eq!(value["name"], "read_file");
        assert_eq!(value["outcome"], "error");
        assert_eq!(value["error"], "File not found: src/lib.rs");
        assert!(value.get("result").is_none());

        let back: ToolCallRecord = serde_json::from_value(value).expect("round-trip");
        assert_eq!(back.outcome, CallOutcome::Error);
    }
}
