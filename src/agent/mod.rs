//! LLM agents over bounded tool-calling loops.
//!
//! Two agent variants share one loop implementation: triage classifies an
//! issue with read-only repository tools, reproduction additionally drives
//! a Docker sandbox. Each run is bounded by an iteration budget and ends
//! either with the finalize tool's structured payload or without a result.

pub mod agent_loop;
pub mod prompts;
pub mod reproduce;
pub mod tools;
pub mod triage;

pub use agent_loop::{AgentError, AgentLoop, AgentRun, HistoryTurn, LoopOutcome, SystemPrompt};
pub use reproduce::{ReproductionAgent, DEFAULT_MAX_ITERATIONS, REPRODUCE_TOOL};
pub use tools::{Tool, ToolCallRecord, ToolCallRequest, ToolDeclaration, ToolRegistry};
pub use triage::{TriageAgent, CLASSIFY_TOOL, TRIAGE_MAX_ITERATIONS};
