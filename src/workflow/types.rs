use serde::Serialize;

use crate::agent::types::{ReviewResult, Verdict};

/// Position of a run in the iteration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    CodeGeneration,
    Review,
    Completed,
    IterationLimitReached,
    Failed,
}

/// Per-run state. Created fresh for every run and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub issue_number: u64,
    pub repository: String,
    pub current_iteration: u32,
    pub pr_number: Option<u64>,
    pub branch: Option<String>,
    pub last_review_verdict: Option<Verdict>,
    pub completed: bool,
    pub phase: RunPhase,
}

impl WorkflowState {
    pub fn new(repository: &str, issue_number: u64, start_iteration: u32) -> Self {
        Self {
            issue_number,
            repository: repository.to_string(),
            current_iteration: start_iteration,
            pr_number: None,
            branch: None,
            last_review_verdict: None,
            completed: false,
            phase: RunPhase::Init,
        }
    }

    /// Adopt PR coordinates from a collaborator. Known values are never cleared.
    pub fn merge_pr(&mut self, pr_number: Option<u64>, branch: Option<String>) {
        if pr_number.is_some() {
            self.pr_number = pr_number;
        }
        if branch.is_some() {
            self.branch = branch;
        }
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub message: String,
    pub iteration: u32,
    pub state: WorkflowState,
    pub review: Option<ReviewResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_pr_never_clears() {
        let mut state = WorkflowState::new("octo/widgets", 7, 1);
        state.merge_pr(Some(42), Some("issue-7-iter-1".to_string()));
        state.merge_pr(None, None);
        assert_eq!(state.pr_number, Some(42));
        assert_eq!(state.branch.as_deref(), Some("issue-7-iter-1"));

        state.merge_pr(Some(43), None);
        assert_eq!(state.pr_number, Some(43));
        assert_eq!(state.branch.as_deref(), Some("issue-7-iter-1"));
    }

    #[test]
    fn test_state_serializes_phase() {
        let state = WorkflowState::new("octo/widgets", 7, 1);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "init");
        assert_eq!(json["current_iteration"], 1);
    }
}
