pub mod task;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::server::AppState;
use crate::services::Services;
use crate::workflow::IssueLocks;

use task::Task;

/// Pending tasks per repository, drained by a single processor.
#[derive(Default)]
pub struct TaskQueue {
    queues: HashMap<String, VecDeque<Task>>,
    notify: Option<tokio::sync::mpsc::UnboundedSender<()>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notifier(&mut self, tx: tokio::sync::mpsc::UnboundedSender<()>) {
        self.notify = Some(tx);
    }

    /// Queue a task. Returns `false` when an identical task is already pending.
    pub fn enqueue(&mut self, task: Task) -> bool {
        let queue = self
            .queues
            .entry(task.repo_full_name().to_string())
            .or_default();

        if queue.contains(&task) {
            tracing::info!(task = %task.description(), "Task already pending, skipping");
            return false;
        }

        tracing::info!(task = %task.description(), "Enqueuing task");
        queue.push_back(task);

        if let Some(ref tx) = self.notify {
            let _ = tx.send(());
        }
        true
    }

    /// Take the next task from any repo that has pending work.
    pub fn take_next(&mut self) -> Option<Task> {
        let repo = self
            .queues
            .iter()
            .find(|(_, q)| !q.is_empty())
            .map(|(k, _)| k.clone())?;

        let task = self.queues.get_mut(&repo).and_then(|q| q.pop_front());
        if self.queues.get(&repo).is_some_and(|q| q.is_empty()) {
            self.queues.remove(&repo);
        }
        task
    }

    pub fn pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Remove and return everything still queued.
    pub fn drain(&mut self) -> Vec<Task> {
        self.queues
            .drain()
            .flat_map(|(_, queue)| queue.into_iter())
            .collect()
    }
}

/// Run one task to completion.
pub async fn execute_task(services: &Services, locks: &IssueLocks, task: &Task) {
    match task {
        Task::ProcessIssue {
            repo_full_name,
            issue_number,
            start_iteration,
        } => {
            let _guard = locks.acquire(repo_full_name, *issue_number).await;
            let outcome = services
                .orchestrator()
                .process(repo_full_name, *issue_number, *start_iteration)
                .await;

            if outcome.success {
                tracing::info!(
                    task = %task.description(),
                    iteration = outcome.iteration,
                    message = %outcome.message,
                    "Task completed"
                );
            } else {
                tracing::warn!(
                    task = %task.description(),
                    iteration = outcome.iteration,
                    message = %outcome.message,
                    "Task finished without success"
                );
            }
        }
        Task::ReviewPullRequest {
            repo_full_name,
            pr_number,
        } => {
            let review = match services
                .reviewer
                .execute(repo_full_name, *pr_number, true)
                .await
            {
                Ok(review) => review,
                Err(e) => {
                    tracing::error!(task = %task.description(), error = %e, "Task failed");
                    return;
                }
            };

            if let Err(e) = services
                .reviewer
                .publish_review(repo_full_name, *pr_number, &review)
                .await
            {
                tracing::error!(task = %task.description(), error = %e, "Failed to publish review");
                return;
            }

            tracing::info!(
                task = %task.description(),
                verdict = %review.verdict,
                "Task completed"
            );
        }
    }
}

/// Run the background queue processor.
pub async fn run_queue_processor(state: Arc<AppState>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    {
        let mut queue = state.task_queue.write().await;
        queue.set_notifier(tx);
    }

    tracing::info!("Queue processor started");

    while rx.recv().await.is_some() {
        loop {
            let task = {
                let mut queue = state.task_queue.write().await;
                queue.take_next()
            };

            let Some(task) = task else {
                break;
            };

            tracing::info!(task = %task.description(), "Processing task");
            execute_task(&state.services, &state.issue_locks, &task).await;
        }
    }
}
