//! Reproduction agent: tries to demonstrate the reported flakiness inside
//! an ephemeral Docker sandbox.
//!
//! Same loop as triage, with the three container tools added, a larger
//! caller-configurable budget, and a countdown system prompt so the model
//! knows when it must commit to a verdict.

use std::sync::Arc;

use anyhow::Result;
use bollard::Docker;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::agent_loop::{AgentLoop, LoopOutcome, SystemPrompt};
use super::prompts::{build_reproduction_prompt, REPRODUCTION_SYSTEM_TEMPLATE};
use super::tools::{
    BuildImageTool, CreateContainerTool, ExecuteCommandTool, FinalizeTool, ListDirectoryTool,
    ReadFileTool, ToolRegistry,
};
use crate::explorer::RepoExplorer;
use crate::github::{fetch_issue_bundle, GitHubApi, IssueBundle};
use crate::llm::ModelBackend;
use crate::records::{FilteredIssueRecord, ReproductionRecord, ReproductionResult};
use crate::sandbox::SandboxManager;

/// Default iteration budget for reproduction runs.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Name of the reproduction finalize tool, known to the loop a priori.
pub const REPRODUCE_TOOL: &str = "submit_reproduction";

fn reproduction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "description": "'success' if the flaky failure was observed, 'failure' otherwise."
            },
            "reason": {
                "type": "string",
                "description": "What happened: observed failure rate, or why reproduction was not possible."
            },
            "dockerFile": {
                "type": "string",
                "description": "The Dockerfile that produced the working environment, if one was built."
            },
            "reproductionSteps": {
                "type": "string",
                "description": "Shell commands that demonstrate the flakiness."
            }
        },
        "required": ["status", "reason"]
    })
}

/// One-issue-at-a-time reproducer over a model backend, the GitHub API,
/// and a Docker daemon.
pub struct ReproductionAgent {
    model: Arc<dyn ModelBackend>,
    github: Arc<dyn GitHubApi>,
    docker: Docker,
}

impl ReproductionAgent {
    pub fn new(model: Arc<dyn ModelBackend>, github: Arc<dyn GitHubApi>, docker: Docker) -> Self {
        Self {
            model,
            github,
            docker,
        }
    }

    /// Attempt to reproduce one triaged issue.
    ///
    /// Always returns a full record when the loop ran: inconclusive runs
    /// carry a null result with the complete call history. The sandbox is
    /// torn down whether the loop finished or the model transport failed.
    pub async fn reproduce(
        &self,
        record: &FilteredIssueRecord,
        max_iterations: usize,
    ) -> Result<ReproductionRecord> {
        let explorer = Arc::new(RepoExplorer::new(&record.issue.repo, self.github.clone())?);
        let repo_id = explorer.repo().clone();

        let bundle = match record.issue.number() {
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
                warn!(url = %record.issue.url, "could not parse an issue number from the URL");
                IssueBundle::default()
            }
        };

        let sandbox = Arc::new(Mutex::new(SandboxManager::new(
            self.docker.clone(),
            Some(repo_id),
        )));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadFileTool::new(explorer.clone())));
        registry.register(Arc::new(ListDirectoryTool::new(explorer.clone())));
        registry.register(Arc::new(BuildImageTool::new(sandbox.clone())));
        registry.register(Arc::new(CreateContainerTool::new(sandbox.clone())));
        registry.register(Arc::new(ExecuteCommandTool::new(sandbox.clone())));
        registry.register(Arc::new(FinalizeTool::new(
            REPRODUCE_TOOL,
            "Submit your final reproduction result for this issue. Calling \
             this tool ends the reproduction run.",
            reproduction_schema(),
        )));

        let agent = AgentLoop::new(
            self.model.clone(),
            registry,
            SystemPrompt::Countdown(REPRODUCTION_SYSTEM_TEMPLATE.to_string()),
            REPRODUCE_TOOL,
            max_iterations,
        );

        let prompt = build_reproduction_prompt(record, &bundle);
        let run = agent.run(&prompt).await;

        sandbox.lock().await.teardown().await;
        let run = run?;

        let reproduction_result = match run.outcome {
            LoopOutcome::Finalized(arguments) => {
                match serde_json::from_value::<ReproductionResult>(arguments) {
                    Ok(result) => {
                        info!(
                            url = %record.issue.url,
                            status = ?result.status,
                            iterations = run.iterations,
                            "reproduction run finalized"
                        );
                        Some(result)
                    }
                    Err(err) => {
                        warn!(
                            url = %record.issue.url,
                            error = %err,
                            "reproduction payload did not match the expected schema, treating as inconclusive"
                        );
                        None
                    }
                }
            }
            LoopOutcome::NoToolCall => {
                info!(url = %record.issue.url, "model answered without a result, run is inconclusive");
                None
            }
            LoopOutcome::BudgetExhausted => {
                warn!(
                    url = %record.issue.url,
                    budget = max_iterations,
                    "reproduction budget exhausted without a result"
                );
                None
            }
        };

        Ok(ReproductionRecord {
            issue: record.clone(),
            max_iterations,
            reproduction_result,
            function_call_history: run.calls,
            agent_responses: run.responses,
        })
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
    use crate::records::{Classification, IssueRecord, ReproductionStatus};
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

    fn filtered_issue() -> FilteredIssueRecord {
        FilteredIssueRecord::from_classification(
            IssueRecord {
                title: "flaky test".to_string(),
                url: "https://github.com/o/r/issues/2".to_string(),
                repo: "o/r".to_string(),
                stars: 5,
                comments: 0,
                reactions: 0,
                created: chrono::Utc::now(),
            },
            Classification {
                is_flaky_test_issue: true,
                confidence: 80,
                summary: Some("timing".to_string()),
                reasoning: "r".to_string(),
                environment: None,
            },
        )
    }

    fn agent(response: ModelResponse) -> ReproductionAgent {
        ReproductionAgent::new(
            Arc::new(OneShotModel { response }),
            Arc::new(EmptyApi),
            Docker::connect_with_local_defaults().expect("docker client"),
        )
    }

    #[tokio::test]
    async fn finalized_run_carries_the_result() {
        let agent = agent(ModelResponse {
            text: None,
            tool_calls: vec![ToolCallRequest {
                name: REPRODUCE_TOOL.to_string(),
                arguments: json!({
                    "status": "failure",
                    "reason": "could not install toolchain"
                }),
            }],
        });

        let record = agent
            .reproduce(&filtered_issue(), 5)
            .await
            .expect("reproduce");
        let result = record.reproduction_result.expect("result");
        assert_eq!(result.status, ReproductionStatus::Failure);
        assert_eq!(record.max_iterations, 5);
    }

    #[tokio::test]
    async fn content_only_run_yields_null_result_with_history() {
        let agent = agent(ModelResponse {
            text: Some("I cannot reproduce this.".to_string()),
            tool_calls: vec![],
        });

        let record = agent
            .reproduce(&filtered_issue(), 5)
            .await
            .expect("reproduce");
        assert!(record.reproduction_result.is_none());
        assert_eq!(record.agent_responses, vec!["I cannot reproduce this."]);
        assert!(record.function_call_history.is_empty());
    }

    #[tokio::test]
    async fn malformed_result_payload_is_inconclusive_not_fatal() {
        let agent = agent(ModelResponse {
            text: None,
            tool_calls: vec![ToolCallRequest {
                name: REPRODUCE_TOOL.to_string(),
                arguments: json!({"status": "maybe"}),
            }],
        });

        let record = agent
            .reproduce(&filtered_issue(), 5)
            .await
            .expect("reproduce");
        assert!(record.reproduction_result.is_none());
    }
}
