use std::sync::Arc;

use crate::agent::code::CodeAgent;
use crate::agent::reviewer::ReviewerAgent;
use crate::agent::types::{CodeRequest, ReviewResult, Verdict};
use crate::error::Result;
use crate::platform::types::BranchPattern;
use crate::platform::SourceControlHost;
use crate::workflow::feedback::previous_feedback;
use crate::workflow::types::{ProcessOutcome, RunPhase, WorkflowState};

/// Drives one issue through code generation and review until approval, failure or the
/// iteration ceiling.
pub struct Orchestrator {
    host: Arc<dyn SourceControlHost>,
    code_agent: Arc<dyn CodeAgent>,
    reviewer: Arc<dyn ReviewerAgent>,
    max_iterations: u32,
}

struct Finish {
    success: bool,
    message: String,
    iteration: u32,
}

impl Orchestrator {
    pub fn new(
        host: Arc<dyn SourceControlHost>,
        code_agent: Arc<dyn CodeAgent>,
        reviewer: Arc<dyn ReviewerAgent>,
        max_iterations: u32,
    ) -> Self {
        Self {
            host,
            code_agent,
            reviewer,
            max_iterations,
        }
    }

    /// Run the loop for one issue. Never fails; errors surface as a `Failed` outcome.
    pub async fn process(
        &self,
        repo_full_name: &str,
        issue_number: u64,
        start_iteration: u32,
    ) -> ProcessOutcome {
        // Iterations are 1-based
        let start_iteration = start_iteration.max(1);
        let mut state = WorkflowState::new(repo_full_name, issue_number, start_iteration);
        let mut last_review = None;

        tracing::info!(
            repo = repo_full_name,
            issue = issue_number,
            start_iteration,
            max_iterations = self.max_iterations,
            "Starting workflow run"
        );

        let finish = match self.run(&mut state, &mut last_review).await {
            Ok(finish) => finish,
            Err(e) => {
                tracing::error!(
                    repo = repo_full_name,
                    issue = issue_number,
                    iteration = state.current_iteration,
                    error = %e,
                    "Workflow run aborted"
                );
                state.phase = RunPhase::Failed;
                Finish {
                    success: false,
                    message: format!("Workflow error: {e}"),
                    iteration: state.current_iteration,
                }
            }
        };

        tracing::info!(
            repo = repo_full_name,
            issue = issue_number,
            iteration = finish.iteration,
            phase = ?state.phase,
            success = finish.success,
            "Workflow run finished"
        );

        ProcessOutcome {
            success: finish.success,
            message: finish.message,
            iteration: finish.iteration,
            state,
            review: last_review,
        }
    }

    async fn run(
        &self,
        state: &mut WorkflowState,
        last_review: &mut Option<ReviewResult>,
    ) -> Result<Finish> {
        let repo = state.repository.clone();
        let start_iteration = state.current_iteration;

        let discovered = self.discover_existing_pr(state).await?;

        while state.current_iteration <= self.max_iterations && !state.completed {
            let iteration = state.current_iteration;

            let generate = match state.last_review_verdict {
                Some(Verdict::ChangesRequested) => true,
                _ => iteration == start_iteration && !discovered,
            };

            if generate {
                state.phase = RunPhase::CodeGeneration;

                let feedback = match state.pr_number {
                    Some(pr_number) if iteration > 1 => {
                        previous_feedback(self.host.as_ref(), &repo, pr_number).await
                    }
                    _ => None,
                };

                let request = CodeRequest {
                    repo: repo.clone(),
                    issue_number: state.issue_number,
                    branch: state.branch.clone(),
                    pr_number: state.pr_number,
                    previous_feedback: feedback,
                    iteration,
                };

                tracing::info!(
                    repo = %repo,
                    issue = state.issue_number,
                    iteration,
                    feedback = request.previous_feedback.is_some(),
                    "Invoking code agent"
                );

                let result = self.code_agent.execute(&request).await?;
                if !result.success {
                    state.phase = RunPhase::Failed;
                    return Ok(Finish {
                        success: false,
                        message: format!("Code agent failed: {}", result.message),
                        iteration,
                    });
                }

                state.merge_pr(result.pr_number, result.branch);
            }

            let Some(pr_number) = state.pr_number else {
                state.phase = RunPhase::Failed;
                return Ok(Finish {
                    success: false,
                    message: "PR was not created".to_string(),
                    iteration,
                });
            };

            state.phase = RunPhase::Review;
            let review = self.reviewer.execute(&repo, pr_number, true).await?;

            if let Err(e) = self.reviewer.publish_review(&repo, pr_number, &review).await {
                tracing::warn!(
                    repo = %repo,
                    pr = pr_number,
                    error = %e,
                    "Failed to publish review, continuing"
                );
            }

            let verdict = review.verdict;
            let degraded = review.degraded.then(|| review.summary.clone());
            state.last_review_verdict = Some(verdict);
            *last_review = Some(review);

            tracing::info!(
                repo = %repo,
                issue = state.issue_number,
                pr = pr_number,
                iteration,
                verdict = %verdict,
                "Review verdict"
            );

            match verdict {
                Verdict::Approved => {
                    state.completed = true;
                    state.phase = RunPhase::Completed;
                    return Ok(Finish {
                        success: true,
                        message: format!("PR #{pr_number} approved at iteration {iteration}"),
                        iteration,
                    });
                }
                Verdict::Comment => {
                    state.completed = true;
                    state.phase = RunPhase::Completed;
                    let message = match degraded {
                        Some(reason) => {
                            tracing::warn!(
                                repo = %repo,
                                pr = pr_number,
                                iteration,
                                reason = %reason,
                                "Reviewer produced no verdict"
                            );
                            format!(
                                "Review of PR #{pr_number} was degraded at iteration {iteration}: {reason}"
                            )
                        }
                        None => format!(
                            "Review of PR #{pr_number} finished with comments at iteration {iteration}"
                        ),
                    };
                    return Ok(Finish {
                        success: true,
                        message,
                        iteration,
                    });
                }
                Verdict::ChangesRequested => {
                    state.current_iteration += 1;
                }
            }
        }

        state.phase = RunPhase::IterationLimitReached;
        self.post_limit_comment(state).await;

        Ok(Finish {
            success: false,
            message: format!("Iteration limit ({}) reached", self.max_iterations),
            iteration: state.current_iteration.saturating_sub(1),
        })
    }

    /// Seed the state from an open PR left by an earlier run. Returns whether one was found.
    async fn discover_existing_pr(&self, state: &mut WorkflowState) -> Result<bool> {
        let patterns = [
            BranchPattern::Exact(format!("issue-{}", state.issue_number)),
            BranchPattern::Prefix(format!("issue-{}-iter-", state.issue_number)),
        ];

        for pattern in &patterns {
            if let Some(pr) = self
                .host
                .find_pr_by_branch(&state.repository, pattern)
                .await?
            {
                tracing::info!(
                    repo = %state.repository,
                    issue = state.issue_number,
                    pr = pr.number,
                    branch = %pr.head_branch,
                    "Found existing PR"
                );
                state.merge_pr(Some(pr.number), Some(pr.head_branch));
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn post_limit_comment(&self, state: &WorkflowState) {
        let pr = state
            .pr_number
            .map(|n| format!("#{n}"))
            .unwrap_or_else(|| "not created".to_string());
        let body = format!(
            "Iteration limit ({}) reached without an approving review. Current PR: {pr}",
            self.max_iterations
        );

        tracing::warn!(
            repo = %state.repository,
            issue = state.issue_number,
            pr = ?state.pr_number,
            "Iteration limit reached"
        );

        if let Err(e) = self
            .host
            .create_comment(&state.repository, state.issue_number, &body)
            .await
        {
            tracing::error!(
                repo = %state.repository,
                issue = state.issue_number,
                error = %e,
                "Failed to post iteration limit comment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::AgentExecutionResult;
    use crate::error::AppError;
    use crate::platform::types::ReviewState;
    use crate::testing::{pull_request, review, MockHost, ScriptedCodeAgent, ScriptedReviewer};

    const REPO: &str = "octo/widgets";

    struct Fixture {
        host: Arc<MockHost>,
        code: Arc<ScriptedCodeAgent>,
        reviewer: Arc<ScriptedReviewer>,
    }

    impl Fixture {
        fn new(code: ScriptedCodeAgent, reviewer: ScriptedReviewer) -> Self {
            Self {
                host: Arc::new(MockHost::new()),
                code: Arc::new(code),
                reviewer: Arc::new(reviewer),
            }
        }

        fn orchestrator(&self, max_iterations: u32) -> Orchestrator {
            Orchestrator::new(
                self.host.clone(),
                self.code.clone(),
                self.reviewer.clone(),
                max_iterations,
            )
        }
    }

    fn pushes(n: usize) -> Vec<Result<AgentExecutionResult>> {
        (0..n)
            .map(|_| ScriptedCodeAgent::success(42, "issue-7-iter-1"))
            .collect()
    }

    #[tokio::test]
    async fn test_zero_start_iteration_is_treated_as_first() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(2)),
            ScriptedReviewer::new(&[Verdict::ChangesRequested, Verdict::ChangesRequested]),
        );

        let outcome = fx.orchestrator(1).process(REPO, 7, 0).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 1);
        assert_eq!(outcome.state.phase, RunPhase::IterationLimitReached);
        assert_eq!(fx.code.calls(), 1);
        assert_eq!(fx.code.requests()[0].iteration, 1);
    }

    #[tokio::test]
    async fn test_degraded_review_is_reported_in_message() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(1)),
            ScriptedReviewer::with_results(vec![Ok(ReviewResult::comment_only(
                "Review failed: LLM API error: 503",
            ))]),
        );

        let outcome = fx.orchestrator(3).process(REPO, 7, 1).await;

        assert!(outcome.success);
        assert_eq!(outcome.state.phase, RunPhase::Completed);
        assert!(outcome.message.contains("degraded"));
        assert!(outcome.message.contains("503"));
        assert!(outcome.review.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_limit_reached_after_single_iteration() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(1)),
            ScriptedReviewer::new(&[Verdict::ChangesRequested]),
        );

        let outcome = fx.orchestrator(1).process(REPO, 7, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 1);
        assert_eq!(outcome.state.phase, RunPhase::IterationLimitReached);
        assert!(!outcome.state.completed);

        let comments = fx.host.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 7);
        assert!(comments[0].1.contains("#42"));
    }

    #[tokio::test]
    async fn test_existing_pr_is_reviewed_without_new_code() {
        let fx = Fixture::new(
            ScriptedCodeAgent::default(),
            ScriptedReviewer::new(&[Verdict::Approved]),
        );
        fx.host.add_pull_request(pull_request(12, "issue-7"));

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(outcome.success);
        assert_eq!(fx.code.calls(), 0);
        assert_eq!(fx.reviewer.calls(), vec![(12, true)]);
        assert_eq!(outcome.state.pr_number, Some(12));
        assert_eq!(outcome.state.branch.as_deref(), Some("issue-7"));
        assert!(outcome.state.completed);
    }

    #[tokio::test]
    async fn test_iterates_until_approved() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(3)),
            ScriptedReviewer::new(&[
                Verdict::ChangesRequested,
                Verdict::ChangesRequested,
                Verdict::Approved,
            ]),
        );
        fx.host.set_reviews(
            42,
            vec![
                review(1, ReviewState::ChangesRequested, "Add tests"),
                review(2, ReviewState::Commented, "Minor nit"),
            ],
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(outcome.success);
        assert_eq!(outcome.iteration, 3);
        assert_eq!(fx.code.calls(), 3);
        assert_eq!(outcome.state.last_review_verdict, Some(Verdict::Approved));
        assert_eq!(fx.reviewer.published().len(), 3);

        let requests = fx.code.requests();
        assert_eq!(requests[0].iteration, 1);
        assert_eq!(requests[0].pr_number, None);
        assert_eq!(requests[0].previous_feedback, None);
        assert_eq!(requests[1].iteration, 2);
        assert_eq!(requests[1].pr_number, Some(42));
        assert_eq!(requests[1].branch.as_deref(), Some("issue-7-iter-1"));
        assert_eq!(requests[1].previous_feedback.as_deref(), Some("Add tests"));
        assert_eq!(requests[2].iteration, 3);
        assert!(fx.host.comments().is_empty());
    }

    #[tokio::test]
    async fn test_comment_verdict_completes_without_retry() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(1)),
            ScriptedReviewer::new(&[Verdict::Comment]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(outcome.success);
        assert_eq!(outcome.iteration, 1);
        assert_eq!(outcome.state.current_iteration, 1);
        assert_eq!(outcome.state.last_review_verdict, Some(Verdict::Comment));
        assert_eq!(outcome.state.phase, RunPhase::Completed);
        assert_eq!(fx.code.calls(), 1);
    }

    #[tokio::test]
    async fn test_code_agent_failure_stops_at_that_iteration() {
        let mut results = pushes(1);
        results.push(Ok(AgentExecutionResult::failure("model returned no valid changes")));
        let fx = Fixture::new(
            ScriptedCodeAgent::new(results),
            ScriptedReviewer::new(&[Verdict::ChangesRequested]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 2);
        assert_eq!(outcome.state.phase, RunPhase::Failed);
        assert_eq!(
            outcome.message,
            "Code agent failed: model returned no valid changes"
        );
        assert_eq!(fx.reviewer.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_first_pass_failure_skips_review() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(vec![Ok(AgentExecutionResult::failure("clone failed"))]),
            ScriptedReviewer::new(&[]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 1);
        assert!(fx.reviewer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pr_number_fails() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(vec![Ok(AgentExecutionResult {
                success: true,
                message: "pushed".to_string(),
                pr_number: None,
                branch: Some("issue-7-iter-1".to_string()),
                changes: Vec::new(),
            })]),
            ScriptedReviewer::new(&[]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "PR was not created");
        assert_eq!(outcome.state.phase, RunPhase::Failed);
        assert!(fx.reviewer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_beyond_ceiling_reports_limit() {
        let fx = Fixture::new(ScriptedCodeAgent::default(), ScriptedReviewer::new(&[]));

        let outcome = fx.orchestrator(5).process(REPO, 7, 6).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 5);
        assert_eq!(outcome.state.phase, RunPhase::IterationLimitReached);
        assert_eq!(fx.code.calls(), 0);

        let comments = fx.host.comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].1.contains("not created"));
    }

    #[tokio::test]
    async fn test_ceiling_counts_from_start_iteration() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(2)),
            ScriptedReviewer::new(&[Verdict::ChangesRequested, Verdict::ChangesRequested]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 4).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 5);
        assert_eq!(fx.code.calls(), 2);
        assert!(outcome.iteration <= 5);
    }

    #[tokio::test]
    async fn test_collaborator_error_becomes_failed_outcome() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(1)),
            ScriptedReviewer::with_results(vec![Err(AppError::GitHubApi(
                "PR #42 not found".to_string(),
            ))]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state.phase, RunPhase::Failed);
        assert!(outcome.message.contains("PR #42 not found"));
        assert!(outcome.review.is_none());
    }

    #[tokio::test]
    async fn test_discovery_prefers_exact_branch_then_highest_iteration_pr() {
        let fx = Fixture::new(
            ScriptedCodeAgent::default(),
            ScriptedReviewer::new(&[Verdict::Approved]),
        );
        fx.host.add_pull_request(pull_request(20, "issue-7-iter-1"));
        fx.host.add_pull_request(pull_request(25, "issue-7-iter-2"));
        fx.host.add_pull_request(pull_request(30, "issue-70-iter-1"));

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;
        assert_eq!(outcome.state.pr_number, Some(25));

        fx.host.add_pull_request(pull_request(18, "issue-7"));
        let fx2 = Fixture {
            host: fx.host.clone(),
            code: Arc::new(ScriptedCodeAgent::default()),
            reviewer: Arc::new(ScriptedReviewer::new(&[Verdict::Approved])),
        };
        let outcome = fx2.orchestrator(5).process(REPO, 7, 1).await;
        assert_eq!(outcome.state.pr_number, Some(18));
    }

    #[tokio::test]
    async fn test_discovered_pr_gets_code_after_changes_requested() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(vec![ScriptedCodeAgent::success(12, "issue-7")]),
            ScriptedReviewer::new(&[Verdict::ChangesRequested, Verdict::Approved]),
        );
        fx.host.add_pull_request(pull_request(12, "issue-7"));

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(outcome.success);
        assert_eq!(outcome.iteration, 2);
        assert_eq!(fx.code.calls(), 1);
        assert_eq!(fx.code.requests()[0].branch.as_deref(), Some("issue-7"));
        assert_eq!(fx.code.requests()[0].pr_number, Some(12));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_change_outcome() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(1)),
            ScriptedReviewer::new(&[Verdict::Approved]).failing_publish(),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        assert!(outcome.success);
        assert_eq!(outcome.state.phase, RunPhase::Completed);
    }

    #[tokio::test]
    async fn test_limit_comment_failure_keeps_limit_outcome() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(2)),
            ScriptedReviewer::new(&[Verdict::ChangesRequested, Verdict::ChangesRequested]),
        );
        fx.host.fail_comments();

        let outcome = fx.orchestrator(2).process(REPO, 7, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration, 2);
        assert_eq!(outcome.state.phase, RunPhase::IterationLimitReached);
        assert!(outcome.message.contains("Iteration limit (2)"));
    }

    #[tokio::test]
    async fn test_review_result_is_returned() {
        let fx = Fixture::new(
            ScriptedCodeAgent::new(pushes(1)),
            ScriptedReviewer::new(&[Verdict::Approved]),
        );

        let outcome = fx.orchestrator(5).process(REPO, 7, 1).await;

        let review = outcome.review.unwrap();
        assert_eq!(review.verdict, Verdict::Approved);
    }
}
