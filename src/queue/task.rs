/// Work accepted from webhooks and processed in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Full issue → code → review loop.
    ProcessIssue {
        repo_full_name: String,
        issue_number: u64,
        start_iteration: u32,
    },
    /// One-shot review of a pull request opened outside the loop.
    ReviewPullRequest {
        repo_full_name: String,
        pr_number: u64,
    },
}

impl Task {
    pub fn repo_full_name(&self) -> &str {
        match self {
            Task::ProcessIssue { repo_full_name, .. } => repo_full_name,
            Task::ReviewPullRequest { repo_full_name, .. } => repo_full_name,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Task::ProcessIssue {
                repo_full_name,
                issue_number,
                start_iteration,
            } => format!(
                "Process issue #{issue_number} on {repo_full_name} from iteration {start_iteration}"
            ),
            Task::ReviewPullRequest {
                repo_full_name,
                pr_number,
            } => format!("Review PR #{pr_number} on {repo_full_name}"),
        }
    }
}
