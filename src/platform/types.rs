use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Basic repository facts needed to clone and open pull requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
}

/// Where an [`IssueContext`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueOrigin {
    /// Fetched from the host.
    Linked,
    /// Placeholder built from a pull request with no traceable issue.
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueContext {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub state: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub origin: IssueOrigin,
}

impl IssueContext {
    pub fn is_synthetic(&self) -> bool {
        self.origin == IssueOrigin::Synthetic
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
    pub head_sha: String,
    pub state: String,
    /// Unified diff assembled from the per-file patches.
    pub diff: String,
    pub files_changed: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Matches a pull request head branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchPattern {
    Exact(String),
    Prefix(String),
}

impl BranchPattern {
    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchPattern::Exact(name) => branch == name,
            BranchPattern::Prefix(prefix) => branch.starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for BranchPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchPattern::Exact(name) => write!(f, "{name}"),
            BranchPattern::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub state: ReviewState,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    Success,
    Failure,
    Error,
    Pending,
    Cancelled,
}

impl CiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiStatus::Success => "success",
            CiStatus::Failure => "failure",
            CiStatus::Error => "error",
            CiStatus::Pending => "pending",
            CiStatus::Cancelled => "cancelled",
        }
    }
}

/// Status of one automated check against a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiResult {
    pub name: String,
    pub status: CiStatus,
    pub conclusion: Option<String>,
    pub url: Option<String>,
    pub details: Option<String>,
}

pub fn has_pending(results: &[CiResult]) -> bool {
    results.iter().any(|r| r.status == CiStatus::Pending)
}

#[derive(Debug, Clone)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}

/// Inline comment attached to a submitted review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLineComment {
    pub path: String,
    pub line: u64,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub body: String,
    pub comments: Vec<ReviewLineComment>,
}
