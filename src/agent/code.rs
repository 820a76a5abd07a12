use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::agent::llm::LlmClient;
use crate::agent::prompt;
use crate::agent::types::{AgentExecutionResult, ChangeOperation, CodeChange, CodeRequest};
use crate::error::Result;
use crate::platform::types::{BranchPattern, CreatePullRequest, IssueContext};
use crate::platform::SourceControlHost;
use crate::workspace::ChangePublisher;

const CONTEXT_TREE_DEPTH: usize = 3;
const CONTEXT_FILE_LIMIT: usize = 5000;
const CONTEXT_FILES: &[&str] = &[
    "README.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
];
const MIN_CONTENT_CHARS: usize = 10;

/// Turns an issue (and optional review feedback) into a pushed branch and an open PR.
#[async_trait]
pub trait CodeAgent: Send + Sync {
    async fn execute(&self, request: &CodeRequest) -> Result<AgentExecutionResult>;
}

pub fn default_branch_name(issue_number: u64, iteration: u32) -> String {
    format!("issue-{issue_number}-iter-{iteration}")
}

pub struct LlmCodeAgent {
    host: Arc<dyn SourceControlHost>,
    llm: Arc<dyn LlmClient>,
    publisher: Arc<dyn ChangePublisher>,
    timeout: Duration,
}

struct GeneratedPlan {
    plan: String,
    changes: Vec<CodeChange>,
    commit_message: String,
}

impl LlmCodeAgent {
    pub fn new(
        host: Arc<dyn SourceControlHost>,
        llm: Arc<dyn LlmClient>,
        publisher: Arc<dyn ChangePublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            host,
            llm,
            publisher,
            timeout,
        }
    }

    async fn run(&self, request: &CodeRequest, started: Instant) -> Result<AgentExecutionResult> {
        let repo = request.repo.as_str();
        let issue = self.host.get_issue(repo, request.issue_number).await?;
        let branch = request
            .branch
            .clone()
            .unwrap_or_else(|| default_branch_name(request.issue_number, request.iteration));

        let context = self.repository_context(repo).await;

        if started.elapsed() >= self.timeout {
            tracing::warn!(repo, issue = request.issue_number, "Code agent timed out before model call");
            return Ok(AgentExecutionResult::failure(format!(
                "Code agent timed out after {}s",
                self.timeout.as_secs()
            )));
        }

        let user_prompt = prompt::code_user_prompt(
            repo,
            &issue,
            &context,
            request.previous_feedback.as_deref(),
            request.iteration,
        );
        let reply = self
            .llm
            .generate_structured(
                prompt::CODE_SYSTEM_PROMPT,
                &user_prompt,
                &prompt::code_response_schema(),
            )
            .await?;

        let generated = parse_plan(&reply, &issue, request.iteration);
        if generated.changes.is_empty() {
            return Ok(AgentExecutionResult::failure(
                "model returned no valid changes",
            ));
        }

        tracing::info!(
            repo,
            issue = request.issue_number,
            iteration = request.iteration,
            branch = %branch,
            changes = generated.changes.len(),
            "Publishing generated changes"
        );

        let repo_info = self.host.get_repository(repo).await?;
        let published = self
            .publisher
            .publish(&repo_info, &branch, &generated.changes, &generated.commit_message)
            .await?;

        let existing_pr = match request.pr_number {
            Some(number) => Some(number),
            None => self
                .host
                .find_pr_by_branch(repo, &BranchPattern::Exact(branch.clone()))
                .await?
                .map(|pr| pr.number),
        };

        let body = pr_body(&issue, &generated.plan, request.iteration);
        let pr_number = match existing_pr {
            Some(number) => {
                self.host.update_pull_request_body(repo, number, &body).await?;
                number
            }
            None => {
                self.host
                    .create_pull_request(
                        repo,
                        &CreatePullRequest {
                            title: format!("{} (Iteration {})", issue.title, request.iteration),
                            body,
                            head_branch: branch.clone(),
                            base_branch: repo_info.default_branch.clone(),
                        },
                    )
                    .await?
            }
        };

        Ok(AgentExecutionResult {
            success: true,
            message: format!(
                "Pushed {} change(s) to {} branch {branch} ({})",
                generated.changes.len(),
                if published.branch_existed { "existing" } else { "new" },
                published.commit_sha
            ),
            pr_number: Some(pr_number),
            branch: Some(branch),
            changes: generated.changes,
        })
    }

    async fn repository_context(&self, repo: &str) -> String {
        let mut sections = Vec::new();

        match self.host.get_repository_tree(repo, CONTEXT_TREE_DEPTH).await {
            Ok(tree) if !tree.is_empty() => sections.push(format!("### File tree\n{tree}")),
            Ok(_) => {}
            Err(e) => tracing::debug!(repo, error = %e, "Repository tree unavailable"),
        }

        for path in CONTEXT_FILES {
            if let Ok(Some(content)) = self.host.get_file_content(repo, path).await {
                let truncated: String = content.chars().take(CONTEXT_FILE_LIMIT).collect();
                sections.push(format!("### {path}\n```\n{truncated}\n```"));
            }
        }

        sections.join("\n\n")
    }
}

#[async_trait]
impl CodeAgent for LlmCodeAgent {
    async fn execute(&self, request: &CodeRequest) -> Result<AgentExecutionResult> {
        let started = Instant::now();
        match self.run(request, started).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(
                    repo = %request.repo,
                    issue = request.issue_number,
                    iteration = request.iteration,
                    error = %e,
                    "Code agent failed"
                );
                Ok(AgentExecutionResult::failure(e.to_string()))
            }
        }
    }
}

fn parse_plan(reply: &serde_json::Value, issue: &IssueContext, iteration: u32) -> GeneratedPlan {
    let changes = reply["changes"]
        .as_array()
        .map(|items| items.iter().filter_map(parse_change).collect())
        .unwrap_or_default();

    let commit_message = reply["commit_message"]
        .as_str()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Resolve #{} (iteration {iteration})", issue.number));

    GeneratedPlan {
        plan: reply["plan"].as_str().unwrap_or_default().to_string(),
        changes,
        commit_message,
    }
}

/// Validate one model-proposed change. Invalid entries are dropped with a warning.
fn parse_change(item: &serde_json::Value) -> Option<CodeChange> {
    let Some(file_path) = item["file_path"].as_str().map(str::trim).filter(|p| !p.is_empty())
    else {
        tracing::warn!("Dropping change without file_path");
        return None;
    };

    let Some(operation) = item["operation"].as_str().and_then(ChangeOperation::parse) else {
        tracing::warn!(path = file_path, "Dropping change with unknown operation");
        return None;
    };

    if !is_safe_relative_path(file_path) {
        tracing::warn!(path = file_path, "Dropping change outside the repository");
        return None;
    }

    let change = CodeChange {
        file_path: file_path.to_string(),
        operation,
        content: item["content"].as_str().map(str::to_string),
        old_content: item["old_content"].as_str().map(str::to_string),
        line_start: item["line_start"].as_u64().map(|n| n as usize),
        line_end: item["line_end"].as_u64().map(|n| n as usize),
    };

    let whole_file_write = operation != ChangeOperation::Delete && change.line_range().is_none();
    if whole_file_write {
        let meaningful = change
            .content
            .as_deref()
            .map(|c| c.chars().filter(|ch| !ch.is_whitespace()).count())
            .unwrap_or(0);
        if meaningful < MIN_CONTENT_CHARS {
            tracing::warn!(path = file_path, "Dropping change with no usable content");
            return None;
        }
    }

    Some(change)
}

fn is_safe_relative_path(path: &str) -> bool {
    let path = Path::new(path);
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn pr_body(issue: &IssueContext, plan: &str, iteration: u32) -> String {
    let plan = if plan.trim().is_empty() {
        "No plan provided."
    } else {
        plan.trim()
    };
    format!(
        "Resolves #{}\n\n## Plan\n{plan}\n\n---\nIteration {iteration}, generated for issue #{}: {}",
        issue.number, issue.number, issue.title
    )
}
