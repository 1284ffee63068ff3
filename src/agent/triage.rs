//! Triage agent: classifies candidate issues as flaky-test reports.
//!
//! A minimal tool set (repository reads plus the finalize tool) and a small
//! fixed iteration budget; most issues classify from the thread text alone.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use super::agent_loop::{AgentLoop, LoopOutcome, SystemPrompt};
use super::prompts::{build_triage_prompt, TRIAGE_SYSTEM_PROMPT};
use super::tools::{FinalizeTool, ListDirectoryTool, ReadFileTool, ToolRegistry};
use crate::explorer::RepoExplorer;
use crate::github::{fetch_issue_bundle, GitHubApi, IssueBundle};
use crate::llm::ModelBackend;
use crate::records::{Classification, FilteredIssueRecord, IssueRecord};

/// Iteration budget for classification runs.
pub const TRIAGE_MAX_ITERATIONS: usize = 10;

/// Name of the triage finalize tool, known to the loop a priori.
pub const CLASSIFY_TOOL: &str = "submit_classification";

fn classification_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "isFlakyTestIssue": {
                "type": "boolean",
                "description": "Whether the issue reports a flaky test."
            },
            "confidence": {
                "type": "integer",
                "description": "Confidence in the verdict, 0-100."
            },
            "summary": {
                "type": "string",
                "description": "One-paragraph summary of the flaky behavior."
            },
            "reasoning": {
                "type": "string",
                "description": "Why you reached this verdict."
            },
            "environment": {
                "type": "string",
                "description": "Environment the flakiness was reported in, if stated."
            }
        },
        "required": ["isFlakyTestIssue", "confidence", "reasoning"]
    })
}

/// One-issue-at-a-time classifier over a model backend and the GitHub API.
pub struct TriageAgent {
    model: Arc<dyn ModelBackend>,
    github: Arc<dyn GitHubApi>,
}

impl TriageAgent {
    pub fn new(model: Arc<dyn ModelBackend>, github: Arc<dyn GitHubApi>) -> Self {
        Self { model, github }
    }

    /// Classify one issue.
    ///
    /// Returns `Ok(None)` for inconclusive runs (no finalize call). An
    /// invalid repository identity or a finalize payload that does not
    /// match the classification schema is an error: the caller skips the
    /// issue.
    pub async fn classify(&self, issue: &IssueRecord) -> Result<Option<FilteredIssueRecord>> {
        let explorer = Arc::new(RepoExplorer::new(&issue.repo, self.github.clone())?);

        let bundle = match issue.number() {
            Some(number) => {
                fetch_issue_bundle(
                    self.github.as_ref(),
                    explorer.repo().owner(),
                    explorer.repo().repo(),
                    number,
                )
                .await
            }
            None => {
                warn!(url = %issue.url, "could not parse an issue number from the URL");
                IssueBundle::default()
            }
        };

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadFileTool::new(explorer.clone())));
        registry.register(Arc::new(ListDirectoryTool::new(explorer.clone())));
        registry.register(Arc::new(FinalizeTool::new(
            CLASSIFY_TOOL,
            "Submit your final flaky-test classification for this issue. \
             Calling this tool ends the triage run.",
            classification_schema(),
        )));

        let agent = AgentLoop::new(
            self.model.clone(),
            registry,
            SystemPrompt::Fixed(TRIAGE_SYSTEM_PROMPT.to_string()),
            CLASSIFY_TOOL,
            TRIAGE_MAX_ITERATIONS,
        );

        let prompt = build_triage_prompt(issue, &bundle);
        let run = agent.run(&prompt).await?;

        match run.outcome {
            LoopOutcome::Finalized(arguments) => {
                let classification: Classification = serde_json::from_value(arguments)
                    .context("classification payload did not match the expected schema")?;
                info!(
                    repo = %issue.repo,
                    url = %issue.url,
                    flaky = classification.is_flaky_test_issue,
                    confidence = classification.confidence,
                    iterations = run.iterations,
                    "issue classified"
                );
                Ok(Some(FilteredIssueRecord::from_classification(
                    issue.clone(),
                    classification,
                )))
            }
            LoopOutcome::NoToolCall => {
                info!(url = %issue.url, "model answered without a classification, issue is inconclusive");
                Ok(None)
            }
            LoopOutcome::BudgetExhausted => {
                warn!(
                    url = %issue.url,
                    budget = TRIAGE_MAX_ITERATIONS,
                    "triage budget exhausted without a classification"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::agent_loop::HistoryTurn;
    use crate::agent::tools::{ToolCallRequest, ToolDeclaration};
    use crate::error::{GitHubError, LlmError};
    use crate::github::{ContentResponse, IssueComment, IssueDetails, PullRequestDetails};
    use crate::llm::ModelResponse;
    use async_trait::async_trait;

    struct EmptyApi;

    #[async_trait]
    impl GitHubApi for EmptyApi {
        async fn get_content(
            &self,
            _owner: &str,
            _repo: &str,
            _path: &str,
        ) -> Result<ContentResponse, GitHubError> {
            Err(GitHubError::NotFound)
        }

        async fn get_issue(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
        ) -> Result<IssueDetails, GitHubError> {
            Err(GitHubError::NotFound)
        }

        async fn list_comments(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
        ) -> Result<Vec<IssueComment>, GitHubError> {
            Ok(Vec::new())
        }

        async fn get_pull_request(
            &self,
            _owner: &str,
            _repo: &str,
            _number: u64,
        ) -> Result<PullRequestDetails, GitHubError> {
            Err(GitHubError::NotFound)
        }
    }

    struct OneShotModel {
        response: ModelResponse,
    }

    #[async_trait]
    impl ModelBackend for OneShotModel {
        async fn generate(
            &self,
            _system_instruction: &str,
            _history: &[HistoryTurn],
            _tools: &[ToolDeclaration],
        ) -> Result<ModelResponse, LlmError> {
            Ok(self.response.clone())
        }
    }

    fn issue(repo: &str) -> IssueRecord {
        IssueRecord {
            title: "flaky test".to_string(),
            url: "https://github.com/o/r/issues/1".to_string(),
            repo: repo.to_string(),
            stars: 1,
            comments: 0,
            reactions: 0,
            created: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn classify_returns_record_on_finalize() {
        let model = Arc::new(OneShotModel {
            response: ModelResponse {
                text: None,
                tool_calls: vec![ToolCallRequest {
                    name: CLASSIFY_TOOL.to_string(),
                    arguments: json!({
                        "isFlakyTestIssue": true,
                        "confidence": 75,
                        "reasoning": "timing dependent"
                    }),
                }],
            },
        });
        let agent = TriageAgent::new(model, Arc::new(EmptyApi));

        let record = agent
            .classify(&issue("o/r"))
            .await
            .expect("classify")
            .expect("record");
        assert!(record.is_flaky_test_issue);
        assert_eq!(record.confidence, 75);
        assert_eq!(record.issue.repo, "o/r");
    }

    #[tokio::test]
    async fn classify_is_inconclusive_on_plain_text() {
        let model = Arc::new(OneShotModel {
            response: ModelResponse {
                text: Some("hard to say".to_string()),
                tool_calls: vec![],
            },
        });
        let agent = TriageAgent::new(model, Arc::new(EmptyApi));

        let record = agent.classify(&issue("o/r")).await.expect("classify");
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn invalid_repo_name_fails_before_any_model_call() {
        let model = Arc::new(OneShotModel {
            response: ModelResponse::default(),
        });
        let agent = TriageAgent::new(model, Arc::new(EmptyApi));

        let err = agent
            .classify(&issue("not-a-repo"))
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("'not-a-repo'"));
    }

    #[tokio::test]
    async fn malformed_finalize_payload_is_an_error() {
        let model = Arc::new(OneShotModel {
            response: ModelResponse {
                text: None,
                tool_calls: vec![ToolCallRequest {
                    name: CLASSIFY_TOOL.to_string(),
                    arguments: json!({"confidence": "very"}),
                }],
            },
        });
        let agent = TriageAgent::new(model, Arc::new(EmptyApi));

        let err = agent
            .classify(&issue("o/r"))
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("classification payload"));
    }
}
