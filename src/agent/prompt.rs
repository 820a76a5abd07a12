use serde_json::json;

use crate::platform::types::{CiResult, IssueContext, PullRequest, Review};

pub const CODE_SYSTEM_PROMPT: &str = "You are an expert software engineer working on a GitHub repository. \
You resolve issues by proposing concrete file changes. \
Make minimal, focused changes that follow the existing code style. \
Always return complete file contents for created or modified files unless you give a line range.";

pub const REVIEW_SYSTEM_PROMPT: &str = "You are a meticulous code reviewer. \
You judge whether a pull request resolves its issue correctly and safely. \
Approve only when the change is complete and CI is not failing. \
Request changes for bugs, missing requirements or failing checks. \
Use a plain comment when you have remarks that should not block the change.";

pub fn code_user_prompt(
    repo_full_name: &str,
    issue: &IssueContext,
    repo_context: &str,
    previous_feedback: Option<&str>,
    iteration: u32,
) -> String {
    let mut prompt = format!(
        r#"Repository: `{repo_full_name}`
Iteration: {iteration}

## Issue #{number}
**Title:** {title}

**Description:**
{body}
"#,
        number = issue.number,
        title = issue.title,
        body = if issue.body.is_empty() {
            "(no description)"
        } else {
            &issue.body
        },
    );

    if !repo_context.is_empty() {
        prompt.push_str(&format!("\n## Repository context\n{repo_context}\n"));
    }

    if let Some(feedback) = previous_feedback {
        prompt.push_str(&format!(
            "\n## Feedback from the previous review\nAddress every point below.\n\n{feedback}\n"
        ));
    }

    prompt.push_str(
        "\n## Instructions\n\
         1. Write a short plan.\n\
         2. List the file changes. Operations are `create`, `modify` or `delete`.\n\
         3. Paths are relative to the repository root.\n\
         4. Give a one-line commit message.\n",
    );
    prompt
}

pub fn code_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["plan", "changes", "commit_message"],
        "properties": {
            "plan": { "type": "string" },
            "commit_message": { "type": "string" },
            "changes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["file_path", "operation"],
                    "properties": {
                        "file_path": { "type": "string" },
                        "operation": { "type": "string", "enum": ["create", "modify", "delete"] },
                        "content": { "type": "string" },
                        "line_start": { "type": "integer", "minimum": 1 },
                        "line_end": { "type": "integer", "minimum": 1 }
                    }
                }
            }
        }
    })
}

pub fn review_user_prompt(
    repo_full_name: &str,
    issue: &IssueContext,
    pr: &PullRequest,
    ci_results: &[CiResult],
    previous_reviews: &[Review],
    max_diff_chars: usize,
) -> String {
    let issue_section = if issue.is_synthetic() {
        format!(
            "No linked issue was found. The pull request description is the only statement of intent, \
             so judge the change against it with that in mind.\n\n**Title:** {}\n\n{}",
            issue.title, issue.body
        )
    } else {
        format!(
            "**#{} {}**\n\n{}",
            issue.number, issue.title, issue.body
        )
    };

    let ci_section = if ci_results.is_empty() {
        "No CI checks reported.".to_string()
    } else {
        ci_results
            .iter()
            .map(|r| {
                let mut line = format!("- {}: {}", r.name, r.status.as_str());
                if let Some(details) = r.details.as_deref().filter(|d| !d.is_empty()) {
                    line.push_str(&format!(" ({details})"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let recent: Vec<String> = previous_reviews
        .iter()
        .rev()
        .take(2)
        .rev()
        .map(|r| format!("- {:?} by {}: {}", r.state, r.author, r.body))
        .collect();
    let reviews_section = if recent.is_empty() {
        "None.".to_string()
    } else {
        recent.join("\n")
    };

    format!(
        r#"Repository: `{repo_full_name}`

## Issue
{issue_section}

## Pull request #{number}: {title}
Branch `{head}` into `{base}`

{pr_body}

Files changed: {files}

## Diff
```diff
{diff}
```

## CI
{ci_section}

## Previous reviews
{reviews_section}

Decide on a verdict of `approved`, `changes_requested` or `comment`. Attach line comments where useful."#,
        number = pr.number,
        title = pr.title,
        head = pr.head_branch,
        base = pr.base_branch,
        pr_body = pr.body,
        files = pr.files_changed.join(", "),
        diff = truncate_diff(&pr.diff, max_diff_chars),
    )
}

pub fn review_response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["verdict", "summary"],
        "properties": {
            "verdict": { "type": "string", "enum": ["approved", "changes_requested", "comment"] },
            "summary": { "type": "string" },
            "general_feedback": { "type": "string" },
            "comments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["file_path", "line_number", "comment"],
                    "properties": {
                        "file_path": { "type": "string" },
                        "line_number": { "type": "integer", "minimum": 1 },
                        "comment": { "type": "string" },
                        "suggestion": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// Cut a diff to at most `max_chars` characters, noting how much was dropped.
pub fn truncate_diff(diff: &str, max_chars: usize) -> String {
    let total = diff.chars().count();
    if total <= max_chars {
        return diff.to_string();
    }

    let kept: String = diff.chars().take(max_chars).collect();
    format!(
        "{kept}\n... (diff truncated, {} of {total} characters omitted)",
        total - max_chars
    )
}
