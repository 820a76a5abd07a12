use async_trait::async_trait;
use base64::Engine;
use octocrab::Octocrab;
use serde_json::json;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::repo::split_repo;
use crate::platform::types::*;
use crate::platform::SourceControlHost;

use super::mapper;

pub struct GitHubHost {
    client: Octocrab,
}

impl GitHubHost {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(AppError::Config("github.token is empty".to_string()));
        }

        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))?;

        Ok(Self { client })
    }

    async fn pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("/repos/{owner}/{repo}/pulls/{pr_number}/files?per_page=100");
        self.client
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch PR files: {e}")))
    }
}

/// Among candidate PRs, pick the one matching `pattern` with the highest number.
pub fn pick_pull_request<'a>(
    candidates: &'a [serde_json::Value],
    pattern: &BranchPattern,
) -> Option<&'a serde_json::Value> {
    candidates
        .iter()
        .filter(|pr| {
            pr["head"]["ref"]
                .as_str()
                .is_some_and(|branch| pattern.matches(branch))
        })
        .max_by_key(|pr| pr["number"].as_u64().unwrap_or(0))
}

#[async_trait]
impl SourceControlHost for GitHubHost {
    async fn get_repository(&self, repo_full_name: &str) -> Result<RepoInfo> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let url = format!("/repos/{owner}/{repo}");
        let response: serde_json::Value = self
            .client
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch repository: {e}")))?;

        let clone_url = response["clone_url"]
            .as_str()
            .ok_or_else(|| AppError::GitHubApi("No clone_url in response".to_string()))?
            .to_string();

        Ok(RepoInfo {
            full_name: response["full_name"]
                .as_str()
                .unwrap_or(repo_full_name)
                .to_string(),
            clone_url,
            default_branch: response["default_branch"]
                .as_str()
                .unwrap_or("main")
                .to_string(),
        })
    }

    async fn get_issue(&self, repo_full_name: &str, issue_number: u64) -> Result<IssueContext> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let issue = self.client.issues(owner, repo).get(issue_number).await?;

        Ok(mapper::map_issue(&issue))
    }

    async fn get_pull_request(&self, repo_full_name: &str, pr_number: u64) -> Result<PullRequest> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let url = format!("/repos/{owner}/{repo}/pulls/{pr_number}");
        let pr: serde_json::Value = self
            .client
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch PR #{pr_number}: {e}")))?;

        let files = self.pull_request_files(owner, repo, pr_number).await?;

        Ok(mapper::map_pull_request(&pr, &files))
    }

    async fn find_pr_by_branch(
        &self,
        repo_full_name: &str,
        pattern: &BranchPattern,
    ) -> Result<Option<PullRequest>> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let url = format!("/repos/{owner}/{repo}/pulls?state=open&per_page=100");
        let open: Vec<serde_json::Value> = self
            .client
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to list pull requests: {e}")))?;

        let Some(number) = pick_pull_request(&open, pattern).and_then(|pr| pr["number"].as_u64())
        else {
            return Ok(None);
        };

        tracing::debug!(repo = repo_full_name, pattern = %pattern, pr = number, "Matched open PR");

        self.get_pull_request(repo_full_name, number).await.map(Some)
    }

    async fn get_ci_results(&self, repo_full_name: &str, sha: &str) -> Result<Vec<CiResult>> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let status_url = format!("/repos/{owner}/{repo}/commits/{sha}/status");
        let combined: serde_json::Value = self
            .client
            .get(&status_url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch commit status: {e}")))?;

        let runs_url = format!("/repos/{owner}/{repo}/commits/{sha}/check-runs?per_page=100");
        let runs: serde_json::Value = self
            .client
            .get(&runs_url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch check runs: {e}")))?;

        let statuses = combined["statuses"]
            .as_array()
            .map(|items| items.iter().map(mapper::map_commit_status).collect::<Vec<_>>())
            .unwrap_or_default();

        let check_runs = runs["check_runs"]
            .as_array()
            .map(|items| items.iter().map(mapper::map_check_run).collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(statuses.into_iter().chain(check_runs).collect())
    }

    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<u64> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let created = self
            .client
            .pulls(owner, repo)
            .create(&pr.title, &pr.head_branch, &pr.base_branch)
            .body(&pr.body)
            .send()
            .await?;

        tracing::info!(repo = repo_full_name, pr = created.number, "Created pull request");

        Ok(created.number)
    }

    async fn update_pull_request_body(
        &self,
        repo_full_name: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<()> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let url = format!("/repos/{owner}/{repo}/pulls/{pr_number}");
        let _: serde_json::Value = self
            .client
            .patch(&url, Some(&json!({ "body": body })))
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to update PR #{pr_number}: {e}")))?;

        Ok(())
    }

    async fn create_review(
        &self,
        repo_full_name: &str,
        pr_number: u64,
        review: &NewReview,
    ) -> Result<()> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let comments: Vec<serde_json::Value> = review
            .comments
            .iter()
            .map(|c| {
                json!({
                    "path": c.path,
                    "line": c.line,
                    "side": "RIGHT",
                    "body": c.body,
                })
            })
            .collect();

        // GitHub rejects APPROVE and REQUEST_CHANGES on the token owner's own PRs
        let mut payload = json!({
            "body": review.body,
            "event": "COMMENT",
        });
        if !comments.is_empty() {
            payload["comments"] = serde_json::Value::Array(comments);
        }

        let url = format!("/repos/{owner}/{repo}/pulls/{pr_number}/reviews");
        let _: serde_json::Value = self
            .client
            .post(&url, Some(&payload))
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create review: {e}")))?;

        Ok(())
    }

    async fn create_comment(
        &self,
        repo_full_name: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<()> {
        let (owner, repo) = split_repo(repo_full_name)?;

        self.client
            .issues(owner, repo)
            .create_comment(issue_number, body)
            .await?;

        Ok(())
    }

    async fn get_pr_reviews(&self, repo_full_name: &str, pr_number: u64) -> Result<Vec<Review>> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let url = format!("/repos/{owner}/{repo}/pulls/{pr_number}/reviews?per_page=100");
        let reviews: Vec<serde_json::Value> = self
            .client
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch reviews: {e}")))?;

        Ok(reviews.iter().map(mapper::map_review).collect())
    }

    async fn get_repository_tree(&self, repo_full_name: &str, max_depth: usize) -> Result<String> {
        let info = self.get_repository(repo_full_name).await?;
        let (owner, repo) = split_repo(repo_full_name)?;

        let url = format!(
            "/repos/{owner}/{repo}/git/trees/{}?recursive=1",
            urlencoding::encode(&info.default_branch)
        );
        let tree: serde_json::Value = self
            .client
            .get(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch repository tree: {e}")))?;

        let paths: Vec<&str> = tree["tree"]
            .as_array()
            .map(|entries| entries.iter().filter_map(|e| e["path"].as_str()).collect())
            .unwrap_or_default();

        Ok(mapper::render_tree(&paths, max_depth))
    }

    async fn get_file_content(&self, repo_full_name: &str, path: &str) -> Result<Option<String>> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let encoded_path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!("/repos/{owner}/{repo}/contents/{encoded_path}");

        let response: serde_json::Value = match self.client.get(&url, None::<&()>).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(repo = repo_full_name, path, error = %e, "File not readable");
                return Ok(None);
            }
        };

        if response["encoding"].as_str() != Some("base64") {
            return Ok(None);
        }

        // GitHub wraps base64 content at 60 columns
        let raw: String = response["content"]
            .as_str()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let decoded = match base64::engine::general_purpose::STANDARD.decode(raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(path, error = %e, "Invalid base64 in file content");
                return Ok(None);
            }
        };

        Ok(String::from_utf8(decoded).ok())
    }
}
