//! Cached read-only repository exploration.
//!
//! A `RepoExplorer` is bound to a single `owner/repo` and serves file and
//! directory reads to the agent tools. Every successful fetch is cached for
//! the lifetime of the instance, so however often the model asks for the
//! same path, the GitHub API is hit at most once. Instances never share
//! cache state, not even for the same repository.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{ExplorerError, GitHubError};
use crate::github::{ContentResponse, GitHubApi};

/// A validated `owner/repo` identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    owner: String,
    repo: String,
}

impl RepoId {
    /// Parse an `owner/repo` string, splitting on the first `/`.
    ///
    /// Fails fast on anything that does not yield a non-empty owner and a
    /// non-empty repo, naming the offending input.
    pub fn parse(input: &str) -> Result<Self, ExplorerError> {
        let Some((owner, repo)) = input.split_once('/') else {
            return Err(ExplorerError::InvalidRepoName(input.to_string()));
        };
        if owner.is_empty() || repo.is_empty() {
            return Err(ExplorerError::InvalidRepoName(input.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The `owner/repo` form, e.g. for clone URLs and log fields.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Read-only explorer over one repository, with permanent per-instance
/// caching of file contents and directory listings.
pub struct RepoExplorer {
    repo: RepoId,
    api: Arc<dyn GitHubApi>,
    file_cache: Mutex<HashMap<String, String>>,
    dir_cache: Mutex<HashMap<String, Vec<String>>>,
}

impl RepoExplorer {
    /// Bind an explorer to `repo_name`, validating the identity eagerly.
    pub fn new(repo_name: &str, api: Arc<dyn GitHubApi>) -> Result<Self, ExplorerError> {
        let repo = RepoId::parse(repo_name)?;
        Ok(Self::for_repo(repo, api))
    }

    pub fn for_repo(repo: RepoId, api: Arc<dyn GitHubApi>) -> Self {
        Self {
            repo,
            api,
            file_cache: Mutex::new(HashMap::new()),
            dir_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    /// Read a file as text. Cached per path for the instance lifetime.
    pub async fn read_file(&self, path: &str) -> Result<String, ExplorerError> {
        if let Some(cached) = self
            .file_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
        {
            tracing::debug!(repo = %self.repo, path, "file cache hit");
            return Ok(cached.clone());
        }

        let response = self
            .api
            .get_content(self.repo.owner(), self.repo.repo(), path)
            .await
            .map_err(|err| match err {
                GitHubError::NotFound => ExplorerError::FileNotFound(path.to_string()),
                other => ExplorerError::ReadFailed {
                    path: path.to_string(),
                    source: other,
                },
            })?;

        let file = match response {
            ContentResponse::File(file) => file,
            ContentResponse::Directory(_) => {
                return Err(ExplorerError::IsADirectory(path.to_string()));
            }
        };

        let text = decode_content(&file.content, &file.encoding).map_err(|err| {
            ExplorerError::ReadFailed {
                path: path.to_string(),
                source: err,
            }
        })?;

        self.file_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), text.clone());

        Ok(text)
    }

    /// List the entry names of a directory. `.` or the empty string denote
    /// the repository root. Cached per path, including empty listings.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<String>, ExplorerError> {
        let key = normalize_dir_path(path);

        if let Some(cached) = self
            .dir_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            tracing::debug!(repo = %self.repo, path = %key, "directory cache hit");
            return Ok(cached.clone());
        }

        let api_path = if key == "." { "" } else { key.as_str() };
        let response = self
            .api
            .get_content(self.repo.owner(), self.repo.repo(), api_path)
            .await
            .map_err(|err| match err {
                GitHubError::NotFound => ExplorerError::DirectoryNotFound(key.clone()),
                other => ExplorerError::ListFailed {
                    path: key.clone(),
                    source: other,
                },
            })?;

        let entries = match response {
            ContentResponse::Directory(entries) => entries,
            ContentResponse::File(_) => {
                return Err(ExplorerError::IsAFile(key));
            }
        };

        let names: Vec<String> = entries.into_iter().map(|e| e.name).collect();

        self.dir_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, names.clone());

        Ok(names)
    }
}

fn normalize_dir_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." {
        ".".to_string()
    } else {
        trimmed.trim_end_matches('/').to_string()
    }
}

/// Decode the transport encoding of a contents-API payload to text.
///
/// GitHub base64-encodes file bodies and inserts newlines every 60 chars.
fn decode_content(content: &str, encoding: &str) -> Result<String, GitHubError> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64
                .decode(compact.as_bytes())
                .map_err(|e| GitHubError::Decode(format!("invalid base64: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        "none" | "" => Ok(content.to_string()),
        other => Err(GitHubError::Decode(format!(
            "unsupported content encoding '{other}'"
        ))),
    }
}
