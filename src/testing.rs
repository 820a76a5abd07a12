//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::code::CodeAgent;
use crate::agent::llm::LlmClient;
use crate::agent::reviewer::ReviewerAgent;
use crate::agent::types::{AgentExecutionResult, CodeChange, CodeRequest, ReviewResult, Verdict};
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::SourceControlHost;
use crate::workspace::{ChangePublisher, PublishedChanges};

pub fn issue(number: u64, title: &str) -> IssueContext {
    IssueContext {
        number,
        title: title.to_string(),
        body: format!("Body of issue {number}"),
        labels: Vec::new(),
        state: "open".to_string(),
        created_at: None,
        updated_at: None,
        origin: IssueOrigin::Linked,
    }
}

pub fn pull_request(number: u64, head_branch: &str) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR {number}"),
        body: String::new(),
        head_branch: head_branch.to_string(),
        base_branch: "main".to_string(),
        head_sha: format!("sha-{number}"),
        state: "open".to_string(),
        diff: "--- a\n+++ a\n+line".to_string(),
        files_changed: vec!["a".to_string()],
        created_at: None,
        updated_at: None,
    }
}

pub fn review(id: u64, state: ReviewState, body: &str) -> Review {
    Review {
        id,
        author: "reviewer".to_string(),
        body: body.to_string(),
        state,
        submitted_at: None,
    }
}

pub fn ci(name: &str, status: CiStatus) -> CiResult {
    CiResult {
        name: name.to_string(),
        status,
        conclusion: None,
        url: None,
        details: None,
    }
}

pub fn review_result(verdict: Verdict) -> ReviewResult {
    ReviewResult {
        verdict,
        summary: format!("verdict {verdict}"),
        comments: Vec::new(),
        general_feedback: None,
        degraded: false,
    }
}

#[derive(Default)]
struct HostState {
    issues: HashMap<u64, IssueContext>,
    pull_requests: HashMap<u64, PullRequest>,
    reviews: HashMap<u64, Vec<Review>>,
    fail_reviews: bool,
    ci_script: VecDeque<Result<Vec<CiResult>>>,
    ci_calls: usize,
    comments: Vec<(u64, String)>,
    fail_comments: bool,
    submitted_reviews: Vec<(u64, NewReview)>,
    reject_inline_comments: bool,
    created_prs: Vec<CreatePullRequest>,
    updated_bodies: Vec<(u64, String)>,
    files: HashMap<String, String>,
    tree: String,
}

/// Source-control host backed by in-memory maps. Every write is recorded.
#[derive(Default)]
pub struct MockHost {
    state: Mutex<HostState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_issue(&self, issue: IssueContext) {
        self.with(|s| s.issues.insert(issue.number, issue));
    }

    pub fn add_pull_request(&self, pr: PullRequest) {
        self.with(|s| s.pull_requests.insert(pr.number, pr));
    }

    pub fn set_reviews(&self, pr_number: u64, reviews: Vec<Review>) {
        self.with(|s| s.reviews.insert(pr_number, reviews));
    }

    pub fn fail_reviews(&self) {
        self.with(|s| s.fail_reviews = true);
    }

    /// Queue responses for successive `get_ci_results` calls. The last one repeats.
    pub fn script_ci(&self, responses: Vec<Result<Vec<CiResult>>>) {
        self.with(|s| s.ci_script = responses.into());
    }

    pub fn ci_calls(&self) -> usize {
        self.with(|s| s.ci_calls)
    }

    pub fn fail_comments(&self) {
        self.with(|s| s.fail_comments = true);
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.with(|s| s.comments.clone())
    }

    pub fn reject_inline_comments(&self) {
        self.with(|s| s.reject_inline_comments = true);
    }

    pub fn submitted_reviews(&self) -> Vec<(u64, NewReview)> {
        self.with(|s| s.submitted_reviews.clone())
    }

    pub fn created_prs(&self) -> Vec<CreatePullRequest> {
        self.with(|s| s.created_prs.clone())
    }

    pub fn updated_bodies(&self) -> Vec<(u64, String)> {
        self.with(|s| s.updated_bodies.clone())
    }

    pub fn add_file(&self, path: &str, content: &str) {
        self.with(|s| s.files.insert(path.to_string(), content.to_string()));
    }

    pub fn set_tree(&self, tree: &str) {
        self.with(|s| s.tree = tree.to_string());
    }
}

fn clone_result(result: &Result<Vec<CiResult>>) -> Result<Vec<CiResult>> {
    match result {
        Ok(results) => Ok(results.clone()),
        Err(e) => Err(AppError::GitHubApi(e.to_string())),
    }
}

#[async_trait]
impl SourceControlHost for MockHost {
    async fn get_repository(&self, repo_full_name: &str) -> Result<RepoInfo> {
        Ok(RepoInfo {
            full_name: repo_full_name.to_string(),
            clone_url: format!("https://github.com/{repo_full_name}.git"),
            default_branch: "main".to_string(),
        })
    }

    async fn get_issue(&self, _repo: &str, issue_number: u64) -> Result<IssueContext> {
        self.with(|s| s.issues.get(&issue_number).cloned())
            .ok_or_else(|| AppError::GitHubApi(format!("issue #{issue_number} not found")))
    }

    async fn get_pull_request(&self, _repo: &str, pr_number: u64) -> Result<PullRequest> {
        self.with(|s| s.pull_requests.get(&pr_number).cloned())
            .ok_or_else(|| AppError::GitHubApi(format!("PR #{pr_number} not found")))
    }

    async fn find_pr_by_branch(
        &self,
        _repo: &str,
        pattern: &BranchPattern,
    ) -> Result<Option<PullRequest>> {
        Ok(self.with(|s| {
            s.pull_requests
                .values()
                .filter(|pr| pr.state == "open" && pattern.matches(&pr.head_branch))
                .max_by_key(|pr| pr.number)
                .cloned()
        }))
    }

    async fn get_ci_results(&self, _repo: &str, _sha: &str) -> Result<Vec<CiResult>> {
        self.with(|s| {
            s.ci_calls += 1;
            if s.ci_script.len() > 1 {
                s.ci_script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
            } else {
                s.ci_script.front().map(clone_result).unwrap_or_else(|| Ok(Vec::new()))
            }
        })
    }

    async fn create_pull_request(&self, _repo: &str, pr: &CreatePullRequest) -> Result<u64> {
        Ok(self.with(|s| {
            let number = 100 + s.created_prs.len() as u64;
            s.created_prs.push(pr.clone());
            let mut created = pull_request(number, &pr.head_branch);
            created.title = pr.title.clone();
            created.body = pr.body.clone();
            s.pull_requests.insert(number, created);
            number
        }))
    }

    async fn update_pull_request_body(&self, _repo: &str, pr_number: u64, body: &str) -> Result<()> {
        self.with(|s| s.updated_bodies.push((pr_number, body.to_string())));
        Ok(())
    }

    async fn create_review(&self, _repo: &str, pr_number: u64, review: &NewReview) -> Result<()> {
        self.with(|s| {
            if s.reject_inline_comments && !review.comments.is_empty() {
                return Err(AppError::GitHubApi(
                    "Unprocessable Entity: line must be part of the diff".to_string(),
                ));
            }
            s.submitted_reviews.push((pr_number, review.clone()));
            Ok(())
        })
    }

    async fn create_comment(&self, _repo: &str, issue_number: u64, body: &str) -> Result<()> {
        self.with(|s| {
            if s.fail_comments {
                return Err(AppError::GitHubApi("comment rejected".to_string()));
            }
            s.comments.push((issue_number, body.to_string()));
            Ok(())
        })
    }

    async fn get_pr_reviews(&self, _repo: &str, pr_number: u64) -> Result<Vec<Review>> {
        self.with(|s| {
            if s.fail_reviews {
                return Err(AppError::GitHubApi("reviews unavailable".to_string()));
            }
            Ok(s.reviews.get(&pr_number).cloned().unwrap_or_default())
        })
    }

    async fn get_repository_tree(&self, _repo: &str, _max_depth: usize) -> Result<String> {
        Ok(self.with(|s| s.tree.clone()))
    }

    async fn get_file_content(&self, _repo: &str, path: &str) -> Result<Option<String>> {
        Ok(self.with(|s| s.files.get(path).cloned()))
    }
}

/// Code agent returning pre-scripted results and recording every request.
#[derive(Default)]
pub struct ScriptedCodeAgent {
    results: Mutex<VecDeque<Result<AgentExecutionResult>>>,
    requests: Mutex<Vec<CodeRequest>>,
}

impl ScriptedCodeAgent {
    pub fn new(results: Vec<Result<AgentExecutionResult>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn success(pr_number: u64, branch: &str) -> Result<AgentExecutionResult> {
        Ok(AgentExecutionResult {
            success: true,
            message: "changes pushed".to_string(),
            pr_number: Some(pr_number),
            branch: Some(branch.to_string()),
            changes: Vec::new(),
        })
    }

    pub fn requests(&self) -> Vec<CodeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeAgent for ScriptedCodeAgent {
    async fn execute(&self, request: &CodeRequest) -> Result<AgentExecutionResult> {
        self.requests.lock().unwrap().push(request.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Internal("code agent script exhausted".to_string())))
    }
}

/// Reviewer returning pre-scripted results and recording calls and publications.
#[derive(Default)]
pub struct ScriptedReviewer {
    results: Mutex<VecDeque<Result<ReviewResult>>>,
    calls: Mutex<Vec<(u64, bool)>>,
    published: Mutex<Vec<(u64, Verdict)>>,
    fail_publish: bool,
}

impl ScriptedReviewer {
    pub fn new(verdicts: &[Verdict]) -> Self {
        Self::with_results(verdicts.iter().map(|v| Ok(review_result(*v))).collect())
    }

    pub fn with_results(results: Vec<Result<ReviewResult>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn failing_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    pub fn calls(&self) -> Vec<(u64, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(u64, Verdict)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewerAgent for ScriptedReviewer {
    async fn execute(&self, _repo: &str, pr_number: u64, wait_for_ci: bool) -> Result<ReviewResult> {
        self.calls.lock().unwrap().push((pr_number, wait_for_ci));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Internal("reviewer script exhausted".to_string())))
    }

    async fn publish_review(&self, _repo: &str, pr_number: u64, review: &ReviewResult) -> Result<()> {
        if self.fail_publish {
            return Err(AppError::GitHubApi("review rejected".to_string()));
        }
        self.published.lock().unwrap().push((pr_number, review.verdict));
        Ok(())
    }
}

/// Model client returning canned JSON replies in order and recording prompts.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<serde_json::Value>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<serde_json::Value>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate_structured(
        &self,
        _system: &str,
        prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Llm("no scripted reply".to_string())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Publisher that records pushes instead of touching git.
#[derive(Default)]
pub struct RecordingPublisher {
    pushes: Mutex<Vec<(String, Vec<CodeChange>, String)>>,
    fail: bool,
    branch_existed: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn on_existing_branch() -> Self {
        Self {
            branch_existed: true,
            ..Self::default()
        }
    }

    pub fn pushes(&self) -> Vec<(String, Vec<CodeChange>, String)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangePublisher for RecordingPublisher {
    async fn publish(
        &self,
        _repo: &RepoInfo,
        branch: &str,
        changes: &[CodeChange],
        commit_message: &str,
    ) -> Result<PublishedChanges> {
        if self.fail {
            return Err(AppError::Git("push rejected".to_string()));
        }
        self.pushes.lock().unwrap().push((
            branch.to_string(),
            changes.to_vec(),
            commit_message.to_string(),
        ));
        Ok(PublishedChanges {
            commit_sha: "deadbeef".to_string(),
            branch_existed: self.branch_existed,
        })
    }
}
