//! LLM integration for flake-forge.
//!
//! The agent loop talks to the model through the [`ModelBackend`] trait:
//! the full conversation history, the tool declaration set, and the system
//! instruction go in on every call, and either free text or a batch of
//! tool-call requests comes out. The trait keeps the loop testable with
//! scripted backends; [`litellm::LiteLlmClient`] is the production
//! implementation over any OpenAI-compatible endpoint.

pub mod litellm;

pub use litellm::LiteLlmClient;

use async_trait::async_trait;

use crate::agent::agent_loop::HistoryTurn;
use crate::agent::tools::{ToolCallRequest, ToolDeclaration};
use crate::error::LlmError;

/// One model turn: optional free text plus zero or more tool-call requests.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Opaque model capability. Stateless per call: all context is resupplied
/// on every invocation.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[HistoryTurn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelResponse, LlmError>;
}
