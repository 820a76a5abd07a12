use std::sync::LazyLock;

use regex::Regex;

use crate::platform::types::{IssueContext, IssueOrigin, PullRequest};
use crate::platform::SourceControlHost;

static BODY_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)").expect("valid regex"));
static BRANCH_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"issue-(\d+)").expect("valid regex"));

pub fn issue_number_from_body(body: &str) -> Option<u64> {
    BODY_REFERENCE
        .captures(body)
        .and_then(|c| c[1].parse().ok())
        .filter(|n| *n > 0)
}

pub fn issue_number_from_branch(branch: &str) -> Option<u64> {
    BRANCH_REFERENCE
        .captures(branch)
        .and_then(|c| c[1].parse().ok())
        .filter(|n| *n > 0)
}

/// Find the issue a pull request addresses.
///
/// The PR body is checked for `#N` first, then the head branch for `issue-N`. When neither
/// leads to a fetchable issue, a placeholder numbered 0 is built from the PR itself.
pub async fn related_issue(
    host: &dyn SourceControlHost,
    repo_full_name: &str,
    pr: &PullRequest,
) -> IssueContext {
    let candidates = [
        issue_number_from_body(&pr.body),
        issue_number_from_branch(&pr.head_branch),
    ];

    for number in candidates.into_iter().flatten() {
        match host.get_issue(repo_full_name, number).await {
            Ok(issue) => return issue,
            Err(e) => {
                tracing::warn!(
                    repo = repo_full_name,
                    pr = pr.number,
                    issue = number,
                    error = %e,
                    "Referenced issue could not be fetched"
                );
            }
        }
    }

    tracing::info!(repo = repo_full_name, pr = pr.number, "No linked issue, using PR as context");
    synthetic_issue(pr)
}

pub fn synthetic_issue(pr: &PullRequest) -> IssueContext {
    IssueContext {
        number: 0,
        title: pr.title.clone(),
        body: pr.body.clone(),
        labels: Vec::new(),
        state: pr.state.clone(),
        created_at: pr.created_at,
        updated_at: pr.updated_at,
        origin: IssueOrigin::Synthetic,
    }
}
