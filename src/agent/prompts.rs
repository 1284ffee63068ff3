//! System prompts and task-prompt builders for the agents.

use crate::github::IssueBundle;
use crate::records::{FilteredIssueRecord, IssueRecord};

/// System prompt for the triage (classification) agent.
pub const TRIAGE_SYSTEM_PROMPT: &str = r#"You are a software engineer triaging GitHub issues to decide whether each one reports a FLAKY TEST: a test that sometimes passes and sometimes fails without any code change, typically due to timing, concurrency, ordering, network, or environment dependence.

## Available Tools

1. **read_file** - Read a file from the repository (path relative to the repo root).
2. **list_directory** - List the entries of a repository directory ('.' for the root).
3. **submit_classification** - Submit your final verdict. This ends the run.

## Guidelines

1. Start from the issue text and comments; only explore the repository when the text alone is inconclusive (e.g. to inspect the failing test or CI configuration).
2. A report of a test that fails deterministically is NOT a flaky test issue.
3. Express confidence as an integer from 0 to 100.
4. Always finish by calling submit_classification exactly once. Do not answer in plain text.
"#;

/// System prompt template for the reproduction agent. `{remaining}` is
/// replaced with the number of iterations left on every turn.
pub const REPRODUCTION_SYSTEM_TEMPLATE: &str = r#"You are a software engineer attempting to reproduce a flaky test reported in a GitHub issue. You work inside Docker containers: the repository is cloned for you and mounted at /app in every container you create.

## Available Tools

1. **read_file** / **list_directory** - Explore the repository without a container.
2. **build_image** - Build a Docker image from Dockerfile content you write. Do not clone or COPY the repository in the Dockerfile; it is bind-mounted at /app at runtime.
3. **create_container** - Start a container from a built image. It stays alive for repeated commands.
4. **execute_command** - Run a shell command in the container (e.g. install dependencies, run the test many times).
5. **submit_reproduction** - Submit your final result. This ends the run.

## Strategy

1. Inspect the repository to find the test and its runner.
2. Write a minimal Dockerfile with the right toolchain, build it, start a container.
3. Install dependencies and run the suspect test repeatedly; a flaky test must show both passing and failing runs.
4. Report status "success" only if you observed the failure; otherwise report "failure" with the reason. Include the Dockerfile and the commands you used.

You have {remaining} iterations remaining. If this is your last iteration, you MUST call submit_reproduction now with your best assessment.
"#;

/// Cap applied to issue bodies and comments interpolated into prompts.
const MAX_CONTEXT_CHARS: usize = 4_000;

/// Render the shared issue context block: title, repository, body,
/// comments, and linked pull requests, whichever of them were fetched.
fn format_issue_context(issue: &IssueRecord, bundle: &IssueBundle) -> String {
    let mut context = String::new();
    context.push_str(&format!("Issue: {}\n", issue.title));
    context.push_str(&format!("URL: {}\n", issue.url));
    context.push_str(&format!("Repository: {} ({} stars)\n", issue.repo, issue.stars));

    match &bundle.issue {
        Some(details) => {
            context.push_str(&format!("State: {}\n", details.state));
            if let Some(body) = details.body.as_deref() {
                context.push_str("\n## Issue Body\n\n");
                context.push_str(&truncate(body, MAX_CONTEXT_CHARS));
                context.push('\n');
            }
        }
        None => {
            context.push_str("\n(The issue body could not be fetched; only the title is available.)\n");
        }
    }

    if !bundle.comments.is_empty() {
        context.push_str("\n## Comments\n");
        for comment in &bundle.comments {
            let author = comment
                .user
                .as_ref()
                .map(|u| u.login.as_str())
                .unwrap_or("unknown");
            let body = comment.body.as_deref().unwrap_or("");
            context.push_str(&format!(
                "\n--- {author} ---\n{}\n",
                truncate(body, MAX_CONTEXT_CHARS)
            ));
        }
    }

    if !bundle.linked_pulls.is_empty() {
        context.push_str("\n## Linked Pull Requests\n");
        for pr in &bundle.linked_pulls {
            context.push_str(&format!(
                "\n#{} [{}] {}\n{}\n",
                pr.number,
                pr.state,
                pr.title,
                truncate(pr.body.as_deref().unwrap_or(""), 1_000)
            ));
        }
    }

    context
}

/// Task prompt for one triage run.
pub fn build_triage_prompt(issue: &IssueRecord, bundle: &IssueBundle) -> String {
    format!(
        "Classify whether the following GitHub issue reports a flaky test.\n\n{}",
        format_issue_context(issue, bundle)
    )
}

/// Task prompt for one reproduction run.
pub fn build_reproduction_prompt(record: &FilteredIssueRecord, bundle: &IssueBundle) -> String {
    let mut prompt = format!(
        "Attempt to reproduce the flaky test described in the following GitHub issue.\n\n{}",
        format_issue_context(&record.issue, bundle)
    );
    if let Some(summary) = record.summary.as_deref() {
        prompt.push_str(&format!("\n## Triage Summary\n\n{summary}\n"));
    }
    if let Some(environment) = record.environment.as_deref() {
        prompt.push_str(&format!("\n## Reported Environment\n\n{environment}\n"));
    }
    prompt
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{CommentAuthor, IssueComment, IssueDetails};

    fn issue() -> IssueRecord {
        IssueRecord {
            title: "flaky: test_timeout".to_string(),
            url: "https://github.com/o/r/issues/9".to_string(),
            repo: "o/r".to_string(),
            stars: 10,
            comments: 1,
            reactions: 0,
            created: chrono::Utc::now(),
        }
    }

    #[test]
    fn triage_prompt_includes_issue_body_and_comments() {
        let bundle = IssueBundle {
            issue: Some(IssueDetails {
                number: 9,
                title: "flaky: test_timeout".to_string(),
                body: Some("It fails about once in ten runs.".to_string()),
                state: "open".to_string(),
            }),
            comments: vec![IssueComment {
                body: Some("Only on slow runners.".to_string()),
                user: Some(CommentAuthor {
                    login: "dev1".to_string(),
                }),
            }],
            linked_pulls: vec![],
        };

        let prompt = build_triage_prompt(&issue(), &bundle);
        assert!(prompt.contains("flaky: test_timeout"));
        assert!(prompt.contains("once in ten runs"));
        assert!(prompt.contains("dev1"));
        assert!(prompt.contains("Only on slow runners."));
    }

    #[test]
    fn degraded_bundle_still_produces_a_prompt() {
        let prompt = build_triage_prompt(&issue(), &IssueBundle::default());
        assert!(prompt.contains("flaky: test_timeout"));
        assert!(prompt.contains("could not be fetched"));
    }

    #[test]
    fn reproduction_template_has_countdown_placeholder() {
        assert!(REPRODUCTION_SYSTEM_TEMPLATE.contains("{remaining}"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let long = "x".repeat(10_000);
        let out = truncate(&long, 100);
        assert!(out.len() < 200);
        assert!(out.ends_with("[truncated]"));
    }
}
