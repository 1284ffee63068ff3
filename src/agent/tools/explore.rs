//! Read-only repository exploration tools.
//!
//! Both tools are thin adapters over a shared [`RepoExplorer`]; explorer
//! errors become failed tool results so the model sees the exact message
//! and can adjust its plan.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolResult};
use crate::explorer::RepoExplorer;

/// Fetch one file's text content from the repository under analysis.
pub struct ReadFileTool {
    explorer: Arc<RepoExplorer>,
}

impl ReadFileTool {
    pub fn new(explorer: Arc<RepoExplorer>) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the text content of a file in the repository being analyzed. \
         The path is relative to the repository root, e.g. 'src/lib.rs'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Repository-relative path of the file to read."
                }
            },
            "required": ["path"]
        })
    }

    fn response_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" }
            }
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameters("missing 'path'".to_string()))?;

        match self.explorer.read_file(path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}

/// List the immediate entries of a directory in the repository.
pub struct ListDirectoryTool {
    explorer: Arc<RepoExplorer>,
}

impl ListDirectoryTool {
    pub fn new(explorer: Arc<RepoExplorer>) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the files and subdirectories directly inside a repository \
         directory (not recursive). Use '.' for the repository root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Repository-relative directory path; '.' for the root."
                }
            },
            "required": ["path"]
        })
    }

    fn response_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "entries": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameters("missing 'path'".to_string()))?;

        match self.explorer.list_directory(path).await {
            Ok(entries) => Ok(ToolResult::success(entries.join("\n"))),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GitHubError;
    use crate::github::{
        ContentEntry, ContentFile, ContentResponse, GitHubApi, IssueComment, IssueDetails,
        PullRequestDetails,
    };
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    struct OneFileApi;

    #[async_trait]
    impl GitHubApi for OneFileApi {
        async fn get_content(
            &self,
            _owner: &str,
            _repo: &str,
            path: &str,
        ) -> Result<ContentResponse, GitHubError> {
            match path {
                "Cargo.toml" => Ok(ContentResponse::File(ContentFile {
                    name: "Cargo.toml".to_string(),
                    path: path.to_string(),
                    content: BASE64.encode(b"[package]"),
                    encoding: "base64".to_string(),
                })),
                "" => Ok(ContentResponse::Directory(vec![ContentEntry {
                    name: "Cargo.toml".to_string(),
                    path: "Cargo.toml".to_string(),
                    entry_type: "file".to_string(),
                }])),
                _ => Err(GitHubError::NotFound),
            }
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

    fn explorer() -> Arc<RepoExplorer> {
        Arc::new(RepoExplorer::new("o/r", Arc::new(OneFileApi)).expect("valid repo"))
    }

    #[tokio::test]
    async fn read_file_tool_returns_content() {
        let tool = ReadFileTool::new(explorer());
        let result = tool
            .execute(json!({"path": "Cargo.toml"}))
            .await
            .expect("execute");
        assert!(result.success);
        assert_eq!(result.output, "[package]");
    }

    #[tokio::test]
    async fn read_file_tool_surfaces_not_found_as_failed_result() {
        let tool = ReadFileTool::new(explorer());
        let result = tool
            .execute(json!({"path": "missing.rs"}))
            .await
            .expect("execute");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("File not found: missing.rs"));
    }

    #[tokio::test]
    async fn list_directory_tool_joins_entries() {
        let tool = ListDirectoryTool::new(explorer());
        let result = tool.execute(json!({"path": "."})).await.expect("execute");
        assert!(result.success);
        assert_eq!(result.output, "Cargo.toml");
    }
}
