//! Bounded agent execution loop.
//!
//! Drives a request/response cycle against the model backend: each
//! iteration sends the full history plus the tool declaration set, then
//! dispatches whatever calls come back through the registry, folding
//! successes and failures alike into the conversation. The loop has three
//! terminal states and no others: the designated finalize call arrived
//! (its arguments are the structured result), the model answered with
//! content only, or the iteration budget ran out.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::tools::{ToolCallRecord, ToolCallRequest, ToolRegistry};
use crate::error::LlmError;
use crate::llm::ModelBackend;

/// Errors that can abort an agent run.
///
/// Tool failures never appear here; they are folded into history. Only the
/// model transport itself can abort the loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// One turn of the conversation, in strict chronological order.
#[derive(Debug, Clone)]
pub enum HistoryTurn {
    /// Caller-supplied content (the initial task prompt).
    User(String),
    /// Free text produced by the model.
    ModelText(String),
    /// A tool call requested by the model.
    ModelCall(ToolCallRequest),
    /// The dispatched result for the preceding call.
    ToolResponse(ToolCallRecord),
}

/// System instruction supplied on every model call.
pub enum SystemPrompt {
    /// The same text every turn.
    Fixed(String),
    /// A template whose `{remaining}` placeholder is replaced with the
    /// number of iterations left, so the model sees its shrinking budget.
    Countdown(String),
}

impl SystemPrompt {
    pub fn render(&self, remaining: usize) -> String {
        match self {
            Self::Fixed(text) => text.clone(),
            Self::Countdown(template) => {
                template.replace("{remaining}", &remaining.to_string())
            }
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// The finalize tool was called; carries its arguments.
    Finalized(Value),
    /// The model replied with content only. No structured result.
    NoToolCall,
    /// The iteration budget ran out. No structured result; the caller must
    /// treat this as inconclusive, never as success.
    BudgetExhausted,
}

impl LoopOutcome {
    /// The structured result, present only for finalized runs.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Finalized(value) => Some(value),
            _ => None,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct AgentRun {
    pub outcome: LoopOutcome,
    /// Number of model invocations actually made.
    pub iterations: usize,
    /// Every dispatched call in order, including the finalize call.
    pub calls: Vec<ToolCallRecord>,
    /// Free-text model output, kept for diagnostics.
    pub responses: Vec<String>,
    pub history: Vec<HistoryTurn>,
}

/// The loop itself: a fixed tool set, a system prompt, a finalize tool
/// name known a priori, and an iteration budget.
pub struct AgentLoop {
    model: Arc<dyn ModelBackend>,
    registry: ToolRegistry,
    system: SystemPrompt,
    finalize_tool: String,
    max_iterations: usize,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelBackend>,
        registry: ToolRegistry,
        system: SystemPrompt,
        finalize_tool: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            model,
            registry,
            system,
            finalize_tool: finalize_tool.into(),
            max_iterations,
        }
    }

    /// Run to a terminal state, starting from a single user turn.
    pub async fn run(&self, initial_prompt: &str) -> Result<AgentRun, AgentError> {
        let declarations = self.registry.declarations();
        let mut history = vec![HistoryTurn::User(initial_prompt.to_string())];
        let mut calls: Vec<ToolCallRecord> = Vec::new();
        let mut responses: Vec<String> = Vec::new();

        for iteration in 0..self.max_iterations {
            let remaining = self.max_iterations - iteration;
            let system = self.system.render(remaining);

            let response = self
                .model
                .generate(&system, &history, &declarations)
                .await?;

            if let Some(text) = &response.text {
                if !text.is_empty() {
                    responses.push(text.clone());
                    history.push(HistoryTurn::ModelText(text.clone()));
                }
            }

            if response.tool_calls.is_empty() {
                debug!(iteration, "model produced no tool calls, run ends without a result");
                return Ok(AgentRun {
                    outcome: LoopOutcome::NoToolCall,
                    iterations: iteration + 1,
                    calls,
                    responses,
                    history,
                });
            }

            // Dispatch in the order the model returned the calls; later
            // calls in the batch may depend on earlier ones.
            for call in response.tool_calls {
                if call.name == self.finalize_tool {
                    debug!(iteration, tool = %call.name, "finalize call received");
                    calls.push(ToolCallRecord::success(&call, Value::Null));
                    return Ok(AgentRun {
                        outcome: LoopOutcome::Finalized(call.arguments),
                        iterations: iteration + 1,
                        calls,
                        responses,
                        history,
                    });
                }

                let record = self.dispatch(&call).await;
                history.push(HistoryTurn::ModelCall(call));
                history.push(HistoryTurn::ToolResponse(record.clone()));
                calls.push(record);
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            finalize_tool = %self.finalize_tool,
            "iteration budget exhausted without a finalize call"
        );
        Ok(AgentRun {
            outcome: LoopOutcome::BudgetExhausted,
            iterations: self.max_iterations,
            calls,
            responses,
            history,
        })
    }

    /// Dispatch one call, converting every failure into a record.
    async fn dispatch(&self, call: &ToolCallRequest) -> ToolCallRecord {
        match self
            .registry
            .dispatch(&call.name, call.arguments.clone())
            .await
        {
            Ok(result) if result.success => {
                debug!(tool = %call.name, "tool call succeeded");
                ToolCallRecord::success(call, Value::String(result.output))
            }
            Ok(result) => {
                let message = result
                    .error
                    .unwrap_or_else(|| "tool reported failure".to_string());
                debug!(tool = %call.name, error = %message, "tool call failed");
                ToolCallRecord::failure(call, message)
            }
            Err(err) => {
                debug!(tool = %call.name, error = %err, "tool dispatch failed");
                ToolCallRecord::failure(call, err.to_string())
            }
        }
    }
}
