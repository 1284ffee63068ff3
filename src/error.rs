//! Error types for flake-forge operations.
//!
//! Defines error types for the major subsystems:
//! - GitHub read-API access
//! - Repository exploration (cached file/directory reads)
//! - Docker sandbox lifecycle (image build, container exec)
//! - LLM API interactions

use thiserror::Error;

/// Errors that can occur when talking to the GitHub read API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The requested resource does not exist (HTTP 404).
    #[error("resource not found")]
    NotFound,

    #[error("GitHub API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to decode content: {0}")]
    Decode(String),
}

/// Errors surfaced by the repository explorer.
///
/// Messages are stable: they are replayed verbatim to the model as tool
/// errors, and the model is expected to react to them.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Invalid repository name format: '{0}' (expected 'owner/repo')")]
    InvalidRepoName(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("{0} is a directory, not a file")]
    IsADirectory(String),

    #[error("{0} is a file, not a directory")]
    IsAFile(String),

    #[error("Failed to read file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: GitHubError,
    },

    #[error("Failed to list directory {path}: {source}")]
    ListFailed {
        path: String,
        #[source]
        source: GitHubError,
    },
}

/// Errors that can occur during Docker sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The build stream reported an error step.
    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    /// The build stream completed without errors but the tagged image
    /// cannot be inspected afterwards.
    #[error("build reported success but image '{0}' was not found")]
    ImageMissing(String),

    /// A command was executed before any container existed on this instance.
    #[error("No container has been created yet. Call createContainer first.")]
    NoContainer,

    #[error("Failed to clone repository '{repo}': {message}")]
    CloneFailed { repo: String, message: String },

    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_messages_are_stable() {
        let err = ExplorerError::FileNotFound("src/lib.rs".to_string());
        assert_eq!(err.to_string(), "File not found: src/lib.rs");

        let err = ExplorerError::IsADirectory("src".to_string());
        assert_eq!(err.to_string(), "src is a directory, not a file");

        let err = ExplorerError::IsAFile("README.md".to_string());
        assert_eq!(err.to_string(), "README.md is a file, not a directory");
    }

    #[test]
    fn sandbox_precondition_message_is_exact() {
        assert_eq!(
            SandboxError::NoContainer.to_string(),
            "No container has been created yet. Call createContainer first."
        );
    }

    #[test]
    fn wrapped_explorer_errors_carry_underlying_message() {
        let err = ExplorerError::ReadFailed {
            path: "docs/guide.md".to_string(),
            source: GitHubError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.starts_with("Failed to read file docs/guide.md:"));
        assert!(text.contains("502"));
        assert!(text.contains("bad gateway"));
    }
}
