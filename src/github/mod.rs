//! GitHub read-API client.
//!
//! Everything the agents need from GitHub is read-only: file contents,
//! directory listings, issues, comments, and pull requests. The `GitHubApi`
//! trait is the seam the explorer and the issue-context prefetch sit on, so
//! tests can substitute a scripted backend.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::GitHubError;

/// A file returned by the contents endpoint, with base64-encoded payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentFile {
    pub name: String,
    pub path: String,
    pub content: String,
    pub encoding: String,
}

/// A single entry in a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    /// "file", "dir", "symlink" or "submodule" as reported by the API.
    #[serde(rename = "type")]
    pub entry_type: String,
}

/// The contents endpoint returns an object for a file and an array for a
/// directory; callers must handle both.
#[derive(Debug, Clone)]
pub enum ContentResponse {
    File(ContentFile),
    Directory(Vec<ContentEntry>),
}

/// Issue metadata as returned by the issues endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueDetails {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<CommentAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestDetails {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged: Option<bool>,
}

/// Read-only GitHub capability consumed by the explorer and the agents.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Fetch the contents of `path` in `owner/repo`. An empty path denotes
    /// the repository root.
    async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<ContentResponse, GitHubError>;

    async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<IssueDetails, GitHubError>;

    async fn list_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<IssueComment>, GitHubError>;

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestDetails, GitHubError>;
}

/// REST client for the GitHub API.
pub struct GitHubClient {
    client: Client,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a new client with an optional GitHub token.
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            token,
        }
    }

    /// Create a client with the token taken from `GITHUB_TOKEN` or
    /// `GITHUB_PERSONAL_ACCESS_TOKEN`.
    pub fn from_env() -> Self {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .or_else(|| std::env::var("GITHUB_PERSONAL_ACCESS_TOKEN").ok());
        Self::new(token)
    }

    async fn get_json(&self, url: &str) -> Result<Value, GitHubError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", "flake-forge/1.0")
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Err(GitHubError::NotFound);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<ContentResponse, GitHubError> {
        let url = format!(
            "https://api.github.com/repos/{owner}/{repo}/contents/{}",
            path.trim_start_matches('/')
        );
        let raw = self.get_json(&url).await?;

        if raw.is_array() {
            let entries: Vec<ContentEntry> = serde_json::from_value(raw)
                .map_err(|e| GitHubError::Decode(format!("directory listing: {e}")))?;
            Ok(ContentResponse::Directory(entries))
        } else {
            let file: ContentFile = serde_json::from_value(raw)
                .map_err(|e| GitHubError::Decode(format!("file content: {e}")))?;
            Ok(ContentResponse::File(file))
        }
    }

    async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<IssueDetails, GitHubError> {
        let url = format!("https://api.github.com/repos/{owner}/{repo}/issues/{number}");
        let raw = self.get_json(&url).await?;
        serde_json::from_value(raw).map_err(|e| GitHubError::Decode(format!("issue: {e}")))
    }

    async fn list_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<IssueComment>, GitHubError> {
        let url = format!(
            "https://api.github.com/repos/{owner}/{repo}/issues/{number}/comments?per_page=100"
        );
        let raw = self.get_json(&url).await?;
        serde_json::from_value(raw).map_err(|e| GitHubError::Decode(format!("comments: {e}")))
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestDetails, GitHubError> {
        let url = format!("https://api.github.com/repos/{owner}/{repo}/pulls/{number}");
        let raw = self.get_json(&url).await?;
        serde_json::from_value(raw).map_err(|e| GitHubError::Decode(format!("pull request: {e}")))
    }
}

/// Issue context gathered before an agent run starts: the issue itself,
/// its comment thread, and any pull requests referenced from either.
#[derive(Debug, Clone, Default)]
pub struct IssueBundle {
    pub issue: Option<IssueDetails>,
    pub comments: Vec<IssueComment>,
    pub linked_pulls: Vec<PullRequestDetails>,
}

/// Cross-reference patterns that link an issue thread to pull requests.
const LINK_PATTERNS: [&str; 4] = [
    r"(?i)fixe?[sd]?\s+#(\d+)",
    r"(?i)close[sd]?\s+#(\d+)",
    r"(?i)resolve[sd]?\s+#(\d+)",
    r"(?i)\bPR\s+#(\d+)",
];

/// Extract referenced issue/PR numbers from free text.
pub fn extract_linked_numbers(texts: &[&str]) -> Vec<u64> {
    let regexes: Vec<Regex> = LINK_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

    let mut numbers = Vec::new();
    for text in texts {
        for re in &regexes {
            for caps in re.captures_iter(text) {
                if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                    if !numbers.contains(&n) {
                        numbers.push(n);
                    }
                }
            }
        }
    }
    numbers
}

/// Fetch issue, comments, and linked pull requests for one issue.
///
/// Runs before the agent loop starts, so failures here must not abort the
/// run: each missing piece is logged and the bundle is returned with
/// whatever could be retrieved.
pub async fn fetch_issue_bundle(
    api: &dyn GitHubApi,
    owner: &str,
    repo: &str,
    number: u64,
) -> IssueBundle {
    let mut bundle = IssueBundle::default();

    match api.get_issue(owner, repo, number).await {
        Ok(issue) => bundle.issue = Some(issue),
        Err(err) => {
            tracing::warn!(owner, repo, number, error = %err, "failed to fetch issue, continuing with degraded context");
        }
    }

    match api.list_comments(owner, repo, number).await {
        Ok(comments) => bundle.comments = comments,
        Err(err) => {
            tracing::warn!(owner, repo, number, error = %err, "failed to fetch issue comments");
        }
    }

    let mut texts: Vec<&str> = Vec::new();
    if let Some(body) = bundle.issue.as_ref().and_then(|i| i.body.as_deref()) {
        texts.push(body);
    }
    for comment in &bundle.comments {
        if let Some(body) = comment.body.as_deref() {
            texts.push(body);
        }
    }

    for linked in extract_linked_numbers(&texts) {
        match api.get_pull_request(owner, repo, linked).await {
            Ok(pr) => bundle.linked_pulls.push(pr),
            Err(err) => {
                tracing::debug!(owner, repo, pr = linked, error = %err, "linked reference is not a fetchable pull request");
            }
        }
    }

    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_linked_numbers_basic() {
        let numbers = extract_linked_numbers(&["This fixes #42 and closes #7."]);
        assert_eq!(numbers, vec![42, 7]);
    }

    #[test]
    fn extract_linked_numbers_dedups() {
        let numbers = extract_linked_numbers(&["fixes #5", "Fixed #5, resolves #5"]);
        assert_eq!(numbers, vec![5]);
    }

    #[test]
    fn extract_linked_numbers_ignores_plain_refs() {
        let numbers = extract_linked_numbers(&["see the discussion in #10"]);
        assert!(numbers.is_empty());
    }

    #[test]
    fn content_entry_deserializes_type_field() {
        let entry: ContentEntry = serde_json::from_value(serde_json::json!({
            "name": "src",
            "path": "src",
            "type": "dir"
        }))
        .expect("should deserialize");
        assert_eq!(entry.entry_type, "dir");
    }

    #[test]
    fn issue_details_tolerates_null_body() {
        let issue: IssueDetails = serde_json::from_value(serde_json::json!({
            "number": 12,
            "title": "Flaky test in CI",
            "body": null,
            "state": "open"
        }))
        .expect("should deserialize");
        assert!(issue.body.is_none());
    }
}
