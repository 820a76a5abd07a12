use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::code::default_branch_name;
use crate::agent::types::{AgentExecutionResult, CodeRequest, ReviewResult};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::platform::repo::normalize_repo;
use crate::queue::TaskQueue;
use crate::services::Services;
use crate::workflow::types::ProcessOutcome;
use crate::workflow::IssueLocks;

pub struct AppState {
    pub config: AppConfig,
    pub services: Services,
    pub task_queue: RwLock<TaskQueue>,
    pub issue_locks: IssueLocks,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Ok(Self::with_services(config, services))
    }

    pub fn with_services(config: AppConfig, services: Services) -> Self {
        Self {
            config,
            services,
            task_queue: RwLock::new(TaskQueue::new()),
            issue_locks: IssueLocks::new(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/github", post(crate::webhook::handler::handle_webhook))
        .route("/api/process-issue", post(process_issue))
        .route("/api/code-agent", post(run_code_agent))
        .route("/api/reviewer", post(run_reviewer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRepository(_) => StatusCode::BAD_REQUEST,
            AppError::WebhookVerification(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::GitHubApi(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

async fn health_check() -> &'static str {
    "ok"
}

fn default_iteration() -> u32 {
    1
}

fn default_wait_for_ci() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ProcessIssueRequest {
    pub repo: String,
    pub issue_number: u64,
    #[serde(default = "default_iteration")]
    pub start_iteration: u32,
}

#[derive(Debug, Deserialize)]
pub struct CodeAgentRequest {
    pub repo: String,
    pub issue_number: u64,
    pub branch: Option<String>,
    pub pr_number: Option<u64>,
    #[serde(default = "default_iteration")]
    pub iteration_number: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReviewerRequest {
    pub repo: String,
    pub pr_number: u64,
    #[serde(default = "default_wait_for_ci")]
    pub wait_for_ci: bool,
}

#[derive(Debug, Serialize)]
pub struct ReviewerResponse {
    pub review: ReviewResult,
    pub published: bool,
}

async fn process_issue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessIssueRequest>,
) -> Result<Json<ProcessOutcome>> {
    let repo = normalize_repo(&req.repo)?;
    let start_iteration = req.start_iteration.max(1);

    let _guard = state
        .issue_locks
        .try_acquire(&repo, req.issue_number)
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "issue #{} on {repo} is already being processed",
                req.issue_number
            ))
        })?;

    let outcome = state
        .services
        .orchestrator()
        .process(&repo, req.issue_number, start_iteration)
        .await;

    Ok(Json(outcome))
}

async fn run_code_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CodeAgentRequest>,
) -> Result<Json<AgentExecutionResult>> {
    let repo = normalize_repo(&req.repo)?;
    let iteration = req.iteration_number.max(1);

    let _guard = state
        .issue_locks
        .try_acquire(&repo, req.issue_number)
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "issue #{} on {repo} is already being processed",
                req.issue_number
            ))
        })?;

    let request = CodeRequest {
        repo,
        issue_number: req.issue_number,
        branch: req
            .branch
            .or_else(|| Some(default_branch_name(req.issue_number, iteration))),
        pr_number: req.pr_number,
        previous_feedback: None,
        iteration,
    };

    let result = state.services.code_agent.execute(&request).await?;
    Ok(Json(result))
}

async fn run_reviewer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReviewerRequest>,
) -> Result<Json<ReviewerResponse>> {
    let repo = normalize_repo(&req.repo)?;
    let reviewer = &state.services.reviewer;

    let review = reviewer
        .execute(&repo, req.pr_number, req.wait_for_ci)
        .await?;

    let published = match reviewer.publish_review(&repo, req.pr_number, &review).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(repo = %repo, pr = req.pr_number, error = %e, "Failed to publish review");
            false
        }
    };

    Ok(Json(ReviewerResponse { review, published }))
}
