use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::agent::correlation::related_issue;
use crate::agent::llm::LlmClient;
use crate::agent::prompt;
use crate::agent::types::{ReviewComment, ReviewResult, Verdict};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::platform::types::{NewReview, ReviewLineComment};
use crate::platform::SourceControlHost;
use crate::workflow::ci::await_ci;

/// Judges a pull request and reports the verdict back to the host.
#[async_trait]
pub trait ReviewerAgent: Send + Sync {
    async fn execute(&self, repo: &str, pr_number: u64, wait_for_ci: bool) -> Result<ReviewResult>;

    async fn publish_review(&self, repo: &str, pr_number: u64, review: &ReviewResult) -> Result<()>;
}

/// Timing and size limits for [`LlmReviewerAgent`].
#[derive(Debug, Clone)]
pub struct ReviewerSettings {
    pub timeout: Duration,
    pub ci_poll_interval: Duration,
    pub ci_max_wait: Duration,
    pub max_diff_chars: usize,
}

impl From<&AgentConfig> for ReviewerSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            timeout: config.reviewer_timeout(),
            ci_poll_interval: config.ci_poll_interval(),
            ci_max_wait: config.ci_max_wait(),
            max_diff_chars: config.max_diff_chars,
        }
    }
}

pub struct LlmReviewerAgent {
    host: Arc<dyn SourceControlHost>,
    llm: Arc<dyn LlmClient>,
    settings: ReviewerSettings,
}

impl LlmReviewerAgent {
    pub fn new(
        host: Arc<dyn SourceControlHost>,
        llm: Arc<dyn LlmClient>,
        settings: ReviewerSettings,
    ) -> Self {
        Self {
            host,
            llm,
            settings,
        }
    }

    async fn run(
        &self,
        repo: &str,
        pr_number: u64,
        wait_for_ci: bool,
        started: Instant,
    ) -> Result<ReviewResult> {
        let host = self.host.as_ref();
        let pr = host.get_pull_request(repo, pr_number).await?;
        let issue = related_issue(host, repo, &pr).await;

        let mut ci_results = match host.get_ci_results(repo, &pr.head_sha).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(repo, pr = pr_number, error = %e, "CI results unavailable");
                Vec::new()
            }
        };

        // CI wait has its own budget and does not count against the review timeout
        let mut ci_waited = Duration::ZERO;
        if wait_for_ci {
            let wait_started = Instant::now();
            ci_results = await_ci(
                host,
                repo,
                &pr.head_sha,
                ci_results,
                self.settings.ci_max_wait,
                self.settings.ci_poll_interval,
            )
            .await;
            ci_waited = wait_started.elapsed();
        }

        let previous_reviews = match host.get_pr_reviews(repo, pr_number).await {
            Ok(reviews) => reviews,
            Err(e) => {
                tracing::warn!(repo, pr = pr_number, error = %e, "Previous reviews unavailable");
                Vec::new()
            }
        };

        if started.elapsed().saturating_sub(ci_waited) >= self.settings.timeout {
            tracing::warn!(repo, pr = pr_number, "Review timed out before model call");
            return Ok(ReviewResult::comment_only(format!(
                "Review timed out after {}s; no verdict was reached.",
                self.settings.timeout.as_secs()
            )));
        }

        let user_prompt = prompt::review_user_prompt(
            repo,
            &issue,
            &pr,
            &ci_results,
            &previous_reviews,
            self.settings.max_diff_chars,
        );
        let reply = self
            .llm
            .generate_structured(
                prompt::REVIEW_SYSTEM_PROMPT,
                &user_prompt,
                &prompt::review_response_schema(),
            )
            .await?;

        Ok(parse_review(&reply))
    }
}

#[async_trait]
impl ReviewerAgent for LlmReviewerAgent {
    async fn execute(&self, repo: &str, pr_number: u64, wait_for_ci: bool) -> Result<ReviewResult> {
        let started = Instant::now();
        let review = match self.run(repo, pr_number, wait_for_ci, started).await {
            Ok(review) => review,
            Err(e) => {
                tracing::error!(repo, pr = pr_number, error = %e, "Review failed");
                ReviewResult::comment_only(format!("Review failed: {e}"))
            }
        };

        tracing::info!(
            repo,
            pr = pr_number,
            verdict = %review.verdict,
            comments = review.comments.len(),
            "Review complete"
        );
        Ok(review)
    }

    async fn publish_review(&self, repo: &str, pr_number: u64, review: &ReviewResult) -> Result<()> {
        let comments: Vec<ReviewLineComment> = review
            .comments
            .iter()
            .map(|c| ReviewLineComment {
                path: c.file_path.clone(),
                line: c.line_number,
                body: inline_comment_body(c),
            })
            .collect();

        let mut new_review = NewReview {
            body: render_review_body(review),
            comments,
        };

        match self.host.create_review(repo, pr_number, &new_review).await {
            Ok(()) => Ok(()),
            Err(e) if !new_review.comments.is_empty() => {
                tracing::warn!(
                    repo,
                    pr = pr_number,
                    error = %e,
                    "Inline comments rejected, posting review body only"
                );
                new_review.comments.clear();
                self.host.create_review(repo, pr_number, &new_review).await
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_review(reply: &serde_json::Value) -> ReviewResult {
    let verdict = Verdict::normalize(reply["verdict"].as_str().unwrap_or_default());

    let summary = reply["summary"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No summary provided.")
        .to_string();

    let general_feedback = reply["general_feedback"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let comments = reply["comments"]
        .as_array()
        .map(|items| items.iter().filter_map(parse_comment).collect())
        .unwrap_or_default();

    ReviewResult {
        verdict,
        summary,
        comments,
        general_feedback,
        degraded: false,
    }
}

fn parse_comment(item: &serde_json::Value) -> Option<ReviewComment> {
    let file_path = item["file_path"].as_str().filter(|p| !p.is_empty())?;
    let line_number = item["line_number"].as_u64().filter(|n| *n > 0)?;
    let comment = item["comment"].as_str().filter(|c| !c.trim().is_empty())?;

    Some(ReviewComment {
        file_path: file_path.to_string(),
        line_number,
        comment: comment.to_string(),
        suggestion: item["suggestion"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

fn verdict_header(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Approved => "✅ Approved",
        Verdict::ChangesRequested => "❌ Changes requested",
        Verdict::Comment => "💬 Comment",
    }
}

fn inline_comment_body(comment: &ReviewComment) -> String {
    match &comment.suggestion {
        Some(suggestion) => format!("{}\n\n```suggestion\n{suggestion}\n```", comment.comment),
        None => comment.comment.clone(),
    }
}

pub fn render_review_body(review: &ReviewResult) -> String {
    let mut body = format!(
        "## Automated review: {}\n\n{}\n",
        verdict_header(review.verdict),
        review.summary
    );

    if let Some(feedback) = &review.general_feedback {
        body.push_str(&format!("\n### General feedback\n{feedback}\n"));
    }

    if !review.comments.is_empty() {
        body.push_str("\n### Comments\n");
        for c in &review.comments {
            body.push_str(&format!("- `{}:{}`: {}\n", c.file_path, c.line_number, c.comment));
        }
    }

    body
}
