use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type IssueKey = (String, u64);

/// In-process advisory locks, one per `(repository, issue)`.
///
/// Holding an [`IssueGuard`] means no other run for that issue is in flight in this process.
#[derive(Clone, Default)]
pub struct IssueLocks {
    inner: Arc<Mutex<HashMap<IssueKey, Arc<AsyncMutex<()>>>>>,
}

pub struct IssueGuard {
    _guard: OwnedMutexGuard<()>,
}

impl IssueLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, repo_full_name: &str, issue_number: u64) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Drop idle slots; a held or awaited slot has more than one reference
        map.retain(|_, slot| Arc::strong_count(slot) > 1);
        map.entry((repo_full_name.to_string(), issue_number))
            .or_default()
            .clone()
    }

    /// Wait until the issue is free, then hold it.
    pub async fn acquire(&self, repo_full_name: &str, issue_number: u64) -> IssueGuard {
        let slot = self.slot(repo_full_name, issue_number);
        IssueGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Hold the issue if no other run does.
    pub fn try_acquire(&self, repo_full_name: &str, issue_number: u64) -> Option<IssueGuard> {
        let slot = self.slot(repo_full_name, issue_number);
        slot.try_lock_owned()
            .ok()
            .map(|guard| IssueGuard { _guard: guard })
    }
}
