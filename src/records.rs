//! Persisted JSON record shapes.
//!
//! These structs are the interchange format between the crawl step that
//! discovers candidate issues, the triage pass, and the reproduction pass.
//! Field names are part of the contract (the extension records use
//! camelCase); records must round-trip through serde_json unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::tools::ToolCallRecord;

/// A candidate issue as emitted by the crawl step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub title: String,
    pub url: String,
    /// `owner/repo` of the repository the issue belongs to.
    pub repo: String,
    pub stars: u32,
    pub comments: u32,
    pub reactions: u32,
    pub created: DateTime<Utc>,
}

impl IssueRecord {
    /// Issue number taken from the trailing path segment of the URL.
    pub fn number(&self) -> Option<u64> {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()?
            .parse()
            .ok()
    }
}

/// The triage agent's verdict, carried as the finalize-call payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub is_flaky_test_issue: bool,
    /// 0-100.
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// An issue record extended with the triage verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredIssueRecord {
    #[serde(flatten)]
    pub issue: IssueRecord,
    pub is_flaky_test_issue: bool,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl FilteredIssueRecord {
    pub fn from_classification(issue: IssueRecord, classification: Classification) -> Self {
        Self {
            issue,
            is_flaky_test_issue: classification.is_flaky_test_issue,
            confidence: classification.confidence,
            summary: classification.summary,
            reasoning: classification.reasoning,
            environment: classification.environment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReproductionStatus {
    Success,
    Failure,
}

/// The reproduction agent's verdict, carried as the finalize-call payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReproductionResult {
    pub status: ReproductionStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reproduction_steps: Option<String>,
}

/// Full output of one reproduction run.
///
/// `reproduction_result` stays `null` for inconclusive runs (no finalize
/// call within budget, or a content-only model answer); the call history
/// and the model's free-text responses are captured either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReproductionRecord {
    pub issue: FilteredIssueRecord,
    pub max_iterations: usize,
    pub reproduction_result: Option<ReproductionResult>,
    pub function_call_history: Vec<ToolCallRecord>,
    pub agent_responses: Vec<String>,
}
