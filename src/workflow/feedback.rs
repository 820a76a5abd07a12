use crate::platform::types::{Review, ReviewState};
use crate::platform::SourceControlHost;

/// Pick the review whose body should steer the next code generation.
///
/// Reviews are ordered oldest first. The newest review requesting changes wins, otherwise the
/// newest review of any kind.
pub fn select_feedback(reviews: &[Review]) -> Option<String> {
    reviews
        .iter()
        .rev()
        .find(|r| r.state == ReviewState::ChangesRequested)
        .or_else(|| reviews.last())
        .map(|r| r.body.clone())
}

/// Fetch and select feedback for a PR. Lookup failures mean no feedback.
pub async fn previous_feedback(
    host: &dyn SourceControlHost,
    repo_full_name: &str,
    pr_number: u64,
) -> Option<String> {
    match host.get_pr_reviews(repo_full_name, pr_number).await {
        Ok(reviews) => select_feedback(&reviews),
        Err(e) => {
            tracing::warn!(
                repo = repo_full_name,
                pr = pr_number,
                error = %e,
                "Could not load review history, continuing without feedback"
            );
            None
        }
    }
}
