//! OpenAI-compatible chat client with native function calling.
//!
//! Works against any LiteLLM-compatible `/chat/completions` endpoint. The
//! conversation history kept by the agent loop is translated to the wire
//! message format on every call (the API is stateless), and the tool
//! declaration set is advertised through the standard `tools` array so the
//! model can answer with structured tool calls instead of free text.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ModelBackend, ModelResponse};
use crate::agent::agent_loop::HistoryTurn;
use crate::agent::tools::{ToolCallRequest, ToolDeclaration};
use crate::error::LlmError;

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a new client with explicit configuration.
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a client from environment variables.
    ///
    /// Reads `LITELLM_API_BASE` (required), `LITELLM_API_KEY` (optional),
    /// and `LITELLM_DEFAULT_MODEL` (defaults to
    /// "anthropic/claude-opus-4.5").
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        let model = env::var("LITELLM_DEFAULT_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-opus-4.5".to_string());
        Ok(Self::new(api_base, api_key, model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Wire message for the chat endpoint.
#[derive(Debug, Clone, Serialize)]
struct ApiChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    /// JSON-encoded argument object, per the OpenAI wire format.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDeclaration<'a> {
    #[serde(rename = "type")]
    decl_type: &'static str,
    function: ApiFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiToolDeclaration<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Translate loop history into wire messages.
///
/// Tool-call ids are synthesized per request: the API only requires that an
/// assistant `tool_calls` entry and the following `tool` message agree on
/// the id within one payload.
fn to_messages(system_instruction: &str, history: &[HistoryTurn]) -> Vec<ApiChatMessage> {
    let mut messages = vec![ApiChatMessage::text("system", system_instruction)];
    let mut call_index = 0usize;
    let mut last_call_id = String::new();

    for turn in history {
        match turn {
            HistoryTurn::User(text) => messages.push(ApiChatMessage::text("user", text)),
            HistoryTurn::ModelText(text) => {
                messages.push(ApiChatMessage::text("assistant", text));
            }
            HistoryTurn::ModelCall(call) => {
                last_call_id = format!("call_{call_index}");
                call_index += 1;
                messages.push(ApiChatMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: last_call_id.clone(),
                        call_type: "function".to_string(),
                        function: ApiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    }]),
                    tool_call_id: None,
                });
            }
            HistoryTurn::ToolResponse(record) => {
                let content = match (&record.result, &record.error) {
                    (Some(Value::String(text)), _) => text.clone(),
                    (Some(value), _) => value.to_string(),
                    (None, Some(error)) => format!("Error: {error}"),
                    (None, None) => String::new(),
                };
                messages.push(ApiChatMessage {
                    role: "tool".to_string(),
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: Some(last_call_id.clone()),
                });
            }
        }
    }

    messages
}

fn parse_tool_calls(raw: Option<Vec<ApiToolCall>>) -> Vec<ToolCallRequest> {
    raw.unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::debug!(
                    tool = %call.function.name,
                    error = %e,
                    "tool-call arguments are not valid JSON"
                );
                Value::Null
            });
            ToolCallRequest {
                name: call.function.name,
                arguments,
            }
        })
        .collect()
}

#[async_trait]
impl ModelBackend for LiteLlmClient {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[HistoryTurn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelResponse, LlmError> {
        let api_tools: Vec<ApiToolDeclaration<'_>> = tools
            .iter()
            .map(|tool| ApiToolDeclaration {
                decl_type: "function",
                function: ApiFunctionDef {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.parameters,
                },
            })
            .collect();

        let api_request = ApiRequest {
            model: &self.model,
            messages: to_messages(system_instruction, history),
            tool_choice: if api_tools.is_empty() {
                None
            } else {
                Some("auto")
            },
            tools: api_tools,
        };

        let url = format!("{}/chat/completions", self.api_base);

        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let http_response = http_request
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(LlmError::ApiError {
                    code: status.as_u16(),
                    message: error_response.error.message,
                });
            }
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message: error_text,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("response contained no choices".to_string()))?;

        Ok(ModelResponse {
            text: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls: parse_tool_calls(choice.message.tool_calls),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::ToolCallRecord;
    use serde_json::json;

    #[test]
    fn history_translation_pairs_call_and_response_ids() {
        let call = ToolCallRequest {
            name: "read_file".to_string(),
            arguments: json!({"path": "src/lib.rs"}),
        };
        let record = ToolCallRecord::success(&call, Value::String("content".to_string()));
        let history = vec![
            HistoryTurn::User("triage this".to_string()),
            HistoryTurn::ModelCall(call),
            HistoryTurn::ToolResponse(record),
        ];

        let messages = to_messages("be useful", &history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "tool");

        let call_id = &messages[2].tool_calls.as_ref().expect("tool_calls")[0].id;
        assert_eq!(messages[3].tool_call_id.as_ref(), Some(call_id));
        assert_eq!(messages[3].content.as_deref(), Some("content"));
    }

    #[test]
    fn error_records_become_error_text() {
        let call = ToolCallRequest {
            name: "read_file".to_string(),
            arguments: json!({"path": "nope"}),
        };
        let record = ToolCallRecord::failure(&call, "File not found: nope");
        let history = vec![
            HistoryTurn::ModelCall(call),
            HistoryTurn::ToolResponse(record),
        ];

        let messages = to_messages("sys", &history);
        assert_eq!(
            messages[2].content.as_deref(),
            Some("Error: File not found: nope")
        );
    }

    #[test]
    fn tool_call_arguments_parse_to_json() {
        let calls = parse_tool_calls(Some(vec![ApiToolCall {
            id: "call_0".to_string(),
            call_type: "function".to_string(),
            function: ApiFunctionCall {
                name: "list_directory".to_string(),
                arguments: r#"{"path": "src"}"#.to_string(),
            },
        }]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "list_directory");
        assert_eq!(calls[0].arguments, json!({"path": "src"}));
    }

    #[test]
    fn malformed_arguments_degrade_to_null() {
        let calls = parse_tool_calls(Some(vec![ApiToolCall {
            id: "call_0".to_string(),
            call_type: "function".to_string(),
            function: ApiFunctionCall {
                name: "read_file".to_string(),
                arguments: "not json".to_string(),
            },
        }]));
        assert_eq!(calls[0].arguments, Value::Null);
    }

    #[test]
    fn from_env_requires_api_base() {
        // Runs in isolation from the var to avoid cross-test interference.
        if env::var("LITELLM_API_BASE").is_err() {
            assert!(matches!(
                LiteLlmClient::from_env(),
                Err(LlmError::MissingApiBase)
            ));
        }
    }
}
