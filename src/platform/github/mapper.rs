use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::platform::types::{
    CiResult, CiStatus, IssueContext, IssueOrigin, PullRequest, Review, ReviewState,
};

/// Map octocrab Issue to our platform Issue type.
pub fn map_issue(issue: &octocrab::models::issues::Issue) -> IssueContext {
    IssueContext {
        number: issue.number,
        title: issue.title.clone(),
        body: issue.body.clone().unwrap_or_default(),
        labels: issue.labels.iter().map(|l| l.name.clone()).collect(),
        state: match issue.state {
            octocrab::models::IssueState::Closed => "closed".to_string(),
            _ => "open".to_string(),
        },
        created_at: Some(issue.created_at),
        updated_at: Some(issue.updated_at),
        origin: IssueOrigin::Linked,
    }
}

/// Map a pull request JSON object plus its changed-file entries.
pub fn map_pull_request(pr: &Value, files: &[Value]) -> PullRequest {
    let mut diff = String::new();
    let mut files_changed = Vec::with_capacity(files.len());

    for file in files {
        let filename = str_field(file, "filename");
        if let Some(patch) = file["patch"].as_str() {
            diff.push_str(&format!("--- {filename}\n+++ {filename}\n{patch}\n"));
        }
        files_changed.push(filename);
    }

    PullRequest {
        number: pr["number"].as_u64().unwrap_or(0),
        title: str_field(pr, "title"),
        body: str_field(pr, "body"),
        head_branch: pr["head"]["ref"].as_str().unwrap_or_default().to_string(),
        base_branch: pr["base"]["ref"].as_str().unwrap_or_default().to_string(),
        head_sha: pr["head"]["sha"].as_str().unwrap_or_default().to_string(),
        state: str_field(pr, "state"),
        diff,
        files_changed,
        created_at: timestamp(&pr["created_at"]),
        updated_at: timestamp(&pr["updated_at"]),
    }
}

pub fn map_review(review: &Value) -> Review {
    let state = match review["state"].as_str().unwrap_or("") {
        "APPROVED" => ReviewState::Approved,
        "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
        "DISMISSED" => ReviewState::Dismissed,
        "PENDING" => ReviewState::Pending,
        _ => ReviewState::Commented,
    };

    Review {
        id: review["id"].as_u64().unwrap_or(0),
        author: review["user"]["login"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        body: str_field(review, "body"),
        state,
        submitted_at: timestamp(&review["submitted_at"]),
    }
}

/// Map an entry of the combined commit status `statuses` array.
pub fn map_commit_status(status: &Value) -> CiResult {
    let state = status["state"].as_str().unwrap_or("");
    let ci_status = match state {
        "success" => CiStatus::Success,
        "pending" => CiStatus::Pending,
        "error" => CiStatus::Error,
        _ => CiStatus::Failure,
    };

    CiResult {
        name: str_field(status, "context"),
        status: ci_status,
        conclusion: Some(state.to_string()),
        url: opt_str(&status["target_url"]),
        details: opt_str(&status["description"]),
    }
}

/// Map a check run. Anything not yet completed counts as pending.
pub fn map_check_run(run: &Value) -> CiResult {
    let conclusion = opt_str(&run["conclusion"]);
    let completed = run["status"].as_str() == Some("completed");

    let status = match (completed, conclusion.as_deref()) {
        (false, _) | (true, None) => CiStatus::Pending,
        (true, Some("success" | "neutral" | "skipped")) => CiStatus::Success,
        (true, Some("cancelled")) => CiStatus::Cancelled,
        (true, Some(_)) => CiStatus::Failure,
    };

    CiResult {
        name: str_field(run, "name"),
        status,
        conclusion,
        url: opt_str(&run["html_url"]),
        details: opt_str(&run["output"]["summary"]),
    }
}

/// Render git tree paths as an indented listing, keeping at most `max_depth` segments.
pub fn render_tree(paths: &[&str], max_depth: usize) -> String {
    let mut lines = Vec::new();
    for path in paths {
        let depth = path.split('/').count();
        if depth > max_depth {
            continue;
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        lines.push(format!("{}{}", "  ".repeat(depth - 1), name));
    }
    lines.join("\n")
}

fn str_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

fn opt_str(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.to_string())
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
