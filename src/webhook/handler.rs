use std::sync::{Arc, LazyLock};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use regex::Regex;

use crate::queue::task::Task;
use crate::server::AppState;
use crate::webhook::events::{CheckSuiteEvent, IssuesEvent, PullRequestEvent, WebhookEvent};
use crate::webhook::signature::verify_signature;

/// Branches the issue loop pushes to; pull requests from these are reviewed by the loop itself.
static LOOP_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^issue-\d+(-iter-\d+)?$").expect("valid regex"));

pub fn is_loop_branch(branch: &str) -> bool {
    LOOP_BRANCH.is_match(branch)
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let event_type = match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(et) => et.to_string(),
        None => {
            tracing::warn!("Missing X-GitHub-Event header");
            return StatusCode::BAD_REQUEST;
        }
    };

    match state.config.webhook_secret() {
        Some(secret) => {
            let signature = match headers
                .get("x-hub-signature-256")
                .and_then(|v| v.to_str().ok())
            {
                Some(sig) => sig,
                None => {
                    tracing::warn!("Missing X-Hub-Signature-256 header");
                    return StatusCode::UNAUTHORIZED;
                }
            };

            if let Err(e) = verify_signature(secret, &body, signature) {
                tracing::warn!(error = %e, "Webhook signature verification failed");
                return StatusCode::UNAUTHORIZED;
            }
        }
        None => {
            tracing::warn!("No webhook secret configured, skipping signature verification");
        }
    }

    let event = match WebhookEvent::parse(&event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, event_type = %event_type, "Failed to parse webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::info!(event_type = %event_type, "Received webhook event");

    match event {
        WebhookEvent::Issues(event) => handle_issues_event(&state, event).await,
        WebhookEvent::PullRequest(event) => handle_pull_request_event(&state, event).await,
        WebhookEvent::CheckSuite(event) => handle_check_suite_event(event),
        WebhookEvent::Ping => {
            tracing::info!("Received ping event");
            StatusCode::OK
        }
        WebhookEvent::Unsupported(event_type) => {
            tracing::debug!(event_type = %event_type, "Ignoring unsupported event");
            StatusCode::OK
        }
    }
}

async fn handle_issues_event(state: &AppState, event: IssuesEvent) -> StatusCode {
    // Don't process pull requests via the issues event
    if event.issue.pull_request.is_some() {
        return StatusCode::OK;
    }

    let trigger_label = state.config.github.trigger_label.as_deref();

    let triggered = match (event.action.as_str(), trigger_label) {
        ("opened", None) => true,
        ("opened", Some(label)) => event.has_label(label),
        ("labeled", Some(label)) => event.label.as_ref().is_some_and(|l| l.name == label),
        _ => false,
    };

    if !triggered {
        tracing::debug!(
            repo = %event.repository.full_name,
            issue = event.issue.number,
            action = %event.action,
            "Issue event does not start a run"
        );
        return StatusCode::OK;
    }

    tracing::info!(
        repo = %event.repository.full_name,
        issue = event.issue.number,
        title = %event.issue.title,
        "Issue ready for processing, enqueuing task"
    );

    let task = Task::ProcessIssue {
        repo_full_name: event.repository.full_name,
        issue_number: event.issue.number,
        start_iteration: 1,
    };

    enqueue(state, task).await
}

async fn handle_pull_request_event(state: &AppState, event: PullRequestEvent) -> StatusCode {
    if !matches!(
        event.action.as_str(),
        "opened" | "synchronize" | "reopened"
    ) {
        return StatusCode::OK;
    }

    let branch = &event.pull_request.head.ref_name;
    if is_loop_branch(branch) {
        tracing::debug!(
            repo = %event.repository.full_name,
            pr = event.number,
            branch = %branch,
            "Pull request belongs to an issue run, skipping"
        );
        return StatusCode::OK;
    }

    tracing::info!(
        repo = %event.repository.full_name,
        pr = event.number,
        action = %event.action,
        head_sha = %event.pull_request.head.sha,
        "Pull request updated, enqueuing review"
    );

    let task = Task::ReviewPullRequest {
        repo_full_name: event.repository.full_name,
        pr_number: event.number,
    };

    enqueue(state, task).await
}

fn handle_check_suite_event(event: CheckSuiteEvent) -> StatusCode {
    if event.action == "completed" {
        tracing::info!(
            repo = %event.repository.full_name,
            head_sha = %event.check_suite.head_sha,
            conclusion = ?event.check_suite.conclusion,
            "Check suite completed"
        );
    }
    StatusCode::OK
}

async fn enqueue(state: &AppState, task: Task) -> StatusCode {
    let mut queue = state.task_queue.write().await;
    if queue.enqueue(task) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    }
}
