pub mod github;
pub mod repo;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

/// Everything the agents and the orchestrator need from the source-control host.
#[async_trait]
pub trait SourceControlHost: Send + Sync {
    /// Fetch clone URL and default branch.
    async fn get_repository(&self, repo_full_name: &str) -> Result<RepoInfo>;

    /// Fetch an issue.
    async fn get_issue(&self, repo_full_name: &str, issue_number: u64) -> Result<IssueContext>;

    /// Fetch a pull request, including its diff and changed files.
    async fn get_pull_request(&self, repo_full_name: &str, pr_number: u64) -> Result<PullRequest>;

    /// Find an open pull request whose head branch matches the pattern.
    ///
    /// When several match, the one with the highest number is returned.
    async fn find_pr_by_branch(
        &self,
        repo_full_name: &str,
        pattern: &BranchPattern,
    ) -> Result<Option<PullRequest>>;

    /// All CI statuses and check runs for a commit.
    async fn get_ci_results(&self, repo_full_name: &str, sha: &str) -> Result<Vec<CiResult>>;

    /// Open a pull request and return its number.
    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<u64>;

    /// Overwrite a pull request description.
    async fn update_pull_request_body(
        &self,
        repo_full_name: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<()>;

    /// Submit a review on a pull request.
    async fn create_review(
        &self,
        repo_full_name: &str,
        pr_number: u64,
        review: &NewReview,
    ) -> Result<()>;

    /// Post a comment on an issue or PR.
    async fn create_comment(
        &self,
        repo_full_name: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<()>;

    /// Reviews on a pull request, oldest first.
    async fn get_pr_reviews(&self, repo_full_name: &str, pr_number: u64) -> Result<Vec<Review>>;

    /// Indented file listing of the default branch, limited to `max_depth` path segments.
    async fn get_repository_tree(&self, repo_full_name: &str, max_depth: usize) -> Result<String>;

    /// Text content of a file on the default branch, `None` when absent or unreadable.
    async fn get_file_content(&self, repo_full_name: &str, path: &str) -> Result<Option<String>>;
}
