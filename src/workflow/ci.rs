use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::platform::types::{has_pending, CiResult, CiStatus};
use crate::platform::SourceControlHost;

/// Poll CI for `sha` until nothing is pending or `max_wait` runs out.
///
/// Returns immediately when `initial` has no pending entry. On timeout the most recent results
/// are returned as they are, pending entries included.
pub async fn await_ci(
    host: &dyn SourceControlHost,
    repo_full_name: &str,
    sha: &str,
    initial: Vec<CiResult>,
    max_wait: Duration,
    poll_interval: Duration,
) -> Vec<CiResult> {
    if !has_pending(&initial) {
        return initial;
    }

    let deadline = Instant::now() + max_wait;
    let mut results = initial;

    tracing::info!(
        repo = repo_full_name,
        sha,
        max_wait_secs = max_wait.as_secs(),
        "Waiting for CI to complete"
    );

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let pending: Vec<&str> = results
                .iter()
                .filter(|r| r.status == CiStatus::Pending)
                .map(|r| r.name.as_str())
                .collect();
            tracing::warn!(
                repo = repo_full_name,
                sha,
                pending = ?pending,
                "Timed out waiting for CI, reviewing with partial results"
            );
            return results;
        }

        sleep(poll_interval.min(remaining)).await;

        match host.get_ci_results(repo_full_name, sha).await {
            Ok(latest) => results = latest,
            Err(e) => {
                tracing::warn!(repo = repo_full_name, sha, error = %e, "CI poll failed");
                continue;
            }
        }

        if !has_pending(&results) {
            tracing::info!(repo = repo_full_name, sha, checks = results.len(), "CI complete");
            return results;
        }

        tracing::debug!(repo = repo_full_name, sha, "CI still pending");
    }
}
