use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::agent::types::{ChangeOperation, CodeChange};
use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::platform::types::RepoInfo;
use crate::workspace::{git, ChangePublisher, PublishedChanges};

/// Manages local clones used to commit agent changes.
pub struct WorkspaceManager {
    base_dir: PathBuf,
    token: String,
}

/// A checked-out branch ready for changes.
pub struct Workspace {
    pub path: PathBuf,
    pub branch: String,
    pub branch_existed: bool,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig, token: &str) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            token: token.to_string(),
        }
    }

    async fn prepare_workspace_dir(path: &Path) -> Result<()> {
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to clean workspace: {e}")))?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;
        }
        Ok(())
    }

    /// Fresh clone with `branch` checked out.
    pub async fn prepare(&self, repo: &RepoInfo, branch: &str) -> Result<Workspace> {
        let path = self.workspace_path(&repo.full_name, branch);

        Self::prepare_workspace_dir(&path).await?;
        git::clone(&repo.clone_url, &path, &self.token).await?;
        let branch_existed = git::checkout_remote_or_create(&path, branch, &self.token).await?;

        Ok(Workspace {
            path,
            branch: branch.to_string(),
            branch_existed,
        })
    }

    /// Write the changes into the working tree.
    pub async fn apply_changes(workspace_root: &Path, changes: &[CodeChange]) -> Result<()> {
        for change in changes {
            let target = Self::verify_path(workspace_root, Path::new(&change.file_path))?;

            match change.operation {
                ChangeOperation::Delete => {
                    if target.exists() {
                        tokio::fs::remove_file(&target).await?;
                    } else {
                        tracing::warn!(path = %change.file_path, "Delete requested for missing file");
                    }
                }
                ChangeOperation::Create | ChangeOperation::Modify => {
                    let content = change.content.as_deref().unwrap_or_default();
                    let new_text = match (change.operation, change.line_range()) {
                        (ChangeOperation::Modify, Some((start, end))) => {
                            let existing = tokio::fs::read_to_string(&target).await.map_err(|e| {
                                AppError::Workspace(format!(
                                    "Cannot modify {}: {e}",
                                    change.file_path
                                ))
                            })?;
                            replace_lines(&existing, start, end, content).map_err(|e| {
                                AppError::Workspace(format!("{}: {e}", change.file_path))
                            })?
                        }
                        _ => content.to_string(),
                    };
                    tokio::fs::write(&target, new_text).await?;
                }
            }
        }
        Ok(())
    }

    /// Commit and push. `None` when the changes left the tree untouched.
    pub async fn finalize(&self, workspace: &Workspace, commit_message: &str) -> Result<Option<String>> {
        if !git::has_changes(&workspace.path).await? {
            tracing::info!(branch = %workspace.branch, "No changes to commit");
            return Ok(None);
        }

        git::add_all(&workspace.path).await?;
        let sha = git::commit(&workspace.path, commit_message).await?;
        git::push(&workspace.path, &workspace.branch, &self.token).await?;

        tracing::info!(branch = %workspace.branch, sha = %sha, "Pushed changes");
        Ok(Some(sha))
    }

    pub async fn cleanup(&self, workspace: &Workspace) -> Result<()> {
        if workspace.path.exists() {
            tokio::fs::remove_dir_all(&workspace.path)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to cleanup workspace: {e}")))?;
        }
        Ok(())
    }

    fn workspace_path(&self, repo_full_name: &str, branch: &str) -> PathBuf {
        let safe_name = repo_full_name.replace('/', "__");
        let safe_branch = branch.replace('/', "__");
        self.base_dir.join(format!("{safe_name}__{safe_branch}"))
    }

    /// Resolve `requested_path` inside `workspace_root`, rejecting anything that escapes it.
    pub fn verify_path(workspace_root: &Path, requested_path: &Path) -> Result<PathBuf> {
        if requested_path.is_absolute() {
            return Err(AppError::Workspace(format!(
                "Absolute path not allowed: {}",
                requested_path.display()
            )));
        }

        let full_path = workspace_root.join(requested_path);

        // New files have no canonical form yet, so resolve through the parent
        let canonical = if full_path.exists() {
            full_path
                .canonicalize()
                .map_err(|e| AppError::Workspace(format!("Failed to resolve path: {e}")))?
        } else {
            let parent = full_path
                .parent()
                .ok_or_else(|| AppError::Workspace("Invalid file path".to_string()))?;

            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Workspace(format!("Failed to create directory: {e}")))?;
            }

            let canonical_parent = parent
                .canonicalize()
                .map_err(|e| AppError::Workspace(format!("Failed to resolve path: {e}")))?;

            let file_name = full_path
                .file_name()
                .ok_or_else(|| AppError::Workspace("Invalid file name".to_string()))?;

            canonical_parent.join(file_name)
        };

        let canonical_root = workspace_root
            .canonicalize()
            .map_err(|e| AppError::Workspace(format!("Failed to resolve workspace root: {e}")))?;

        if !canonical.starts_with(&canonical_root) {
            return Err(AppError::Workspace(format!(
                "Path traversal detected: {} is outside workspace",
                requested_path.display()
            )));
        }

        Ok(canonical)
    }
}

/// Replace 1-based inclusive lines `start..=end` of `existing` with `replacement`.
fn replace_lines(existing: &str, start: usize, end: usize, replacement: &str) -> Result<String> {
    let lines: Vec<&str> = existing.lines().collect();
    if start == 0 || start > end || end > lines.len() {
        return Err(AppError::Workspace(format!(
            "line range {start}..={end} out of bounds for {} lines",
            lines.len()
        )));
    }

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..start - 1]);
    out.extend(replacement.lines());
    out.extend_from_slice(&lines[end..]);

    let mut text = out.join("\n");
    if existing.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

#[async_trait]
impl ChangePublisher for WorkspaceManager {
    async fn publish(
        &self,
        repo: &RepoInfo,
        branch: &str,
        changes: &[CodeChange],
        commit_message: &str,
    ) -> Result<PublishedChanges> {
        let workspace = self.prepare(repo, branch).await?;

        let result: Result<PublishedChanges> = async {
            Self::apply_changes(&workspace.path, changes).await?;
            let sha = self.finalize(&workspace, commit_message).await?.ok_or_else(|| {
                AppError::Workspace("changes left the branch unchanged".to_string())
            })?;
            Ok(PublishedChanges {
                commit_sha: sha,
                branch_existed: workspace.branch_existed,
            })
        }
        .await;

        if let Err(e) = self.cleanup(&workspace).await {
            tracing::warn!(path = %workspace.path.display(), error = %e, "Workspace cleanup failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, operation: ChangeOperation, content: Option<&str>) -> CodeChange {
        CodeChange {
            file_path: path.to_string(),
            operation,
            content: content.map(str::to_string),
            old_content: None,
            line_start: None,
            line_end: None,
        }
    }

    #[test]
    fn test_workspace_path_layout() {
        let manager = WorkspaceManager::new(
            &WorkspaceConfig {
                base_dir: PathBuf::from("/tmp/ws"),
            },
            "token",
        );
        assert_eq!(
            manager.workspace_path("octo/widgets", "feature/x"),
            PathBuf::from("/tmp/ws/octo__widgets__feature__x")
        );
    }

    #[test]
    fn test_verify_path_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(WorkspaceManager::verify_path(tmp.path(), Path::new("../escape.txt")).is_err());
        assert!(WorkspaceManager::verify_path(tmp.path(), Path::new("/etc/passwd")).is_err());
        assert!(WorkspaceManager::verify_path(tmp.path(), Path::new("src/new.rs")).is_ok());
    }

    #[test]
    fn test_replace_lines() {
        let text = "one\ntwo\nthree\nfour\n";
        assert_eq!(
            replace_lines(text, 2, 3, "TWO\nTHREE\nextra").unwrap(),
            "one\nTWO\nTHREE\nextra\nfour\n"
        );
        assert_eq!(replace_lines("a\nb", 1, 1, "A").unwrap(), "A\nb");
        assert!(replace_lines(text, 0, 1, "x").is_err());
        assert!(replace_lines(text, 3, 2, "x").is_err());
        assert!(replace_lines(text, 4, 5, "x").is_err());
    }

    #[tokio::test]
    async fn test_apply_changes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.txt"), "obsolete").unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "fn a() {}\nfn b() {}\nfn c() {}\n").unwrap();

        let mut ranged = change("lib.rs", ChangeOperation::Modify, Some("fn b() { todo() }"));
        ranged.line_start = Some(2);
        ranged.line_end = Some(2);

        let changes = vec![
            change("src/widget.rs", ChangeOperation::Create, Some("pub struct Widget;\n")),
            ranged,
            change("old.txt", ChangeOperation::Delete, None),
            change("never-existed.txt", ChangeOperation::Delete, None),
        ];

        WorkspaceManager::apply_changes(tmp.path(), &changes).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(tmp.path().join("src/widget.rs")).unwrap(),
            "pub struct Widget;\n"
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("lib.rs")).unwrap(),
            "fn a() {}\nfn b() { todo() }\nfn c() {}\n"
        );
        assert!(!tmp.path().join("old.txt").exists());
    }

    #[tokio::test]
    async fn test_apply_changes_rejects_escape() {
        let tmp = tempfile::tempdir().unwrap();
        let changes = vec![change("../outside.txt", ChangeOperation::Create, Some("nope"))];
        let err = WorkspaceManager::apply_changes(tmp.path(), &changes)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Path traversal"));
    }
}
