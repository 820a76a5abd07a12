pub mod git;
pub mod manager;

use async_trait::async_trait;

use crate::agent::types::CodeChange;
use crate::error::Result;
use crate::platform::types::RepoInfo;

pub use manager::WorkspaceManager;

#[derive(Debug, Clone)]
pub struct PublishedChanges {
    pub commit_sha: String,
    pub branch_existed: bool,
}

/// Commits a set of changes to a branch and pushes them.
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(
        &self,
        repo: &RepoInfo,
        branch: &str,
        changes: &[CodeChange],
        commit_message: &str,
    ) -> Result<PublishedChanges>;
}
