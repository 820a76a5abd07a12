use std::path::Path;

use git2::{
    build::RepoBuilder, Cred, Direction, FetchOptions, IndexAddOption, PushOptions,
    RemoteCallbacks, Repository, Signature,
};

use crate::error::{AppError, Result};

const COMMIT_AUTHOR: &str = "coding-agents";
const COMMIT_EMAIL: &str = "coding-agents[bot]@users.noreply.github.com";

/// Reject names that git could read as an option.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('-') {
        return Err(AppError::Git(format!("Invalid branch name: '{name}'")));
    }
    Ok(())
}

/// Callbacks that authenticate with the token. The token never reaches `.git/config`.
fn make_callbacks(token: &str) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    callbacks
}

fn make_fetch_options(token: &str) -> FetchOptions<'_> {
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(make_callbacks(token));
    opts
}

fn make_push_options(token: &str) -> PushOptions<'_> {
    let mut opts = PushOptions::new();
    opts.remote_callbacks(make_callbacks(token));
    opts
}

/// Clone a repository over HTTPS into `target`.
pub async fn clone(url: &str, target: &Path, token: &str) -> Result<()> {
    if !url.starts_with("https://") {
        return Err(AppError::Git(format!(
            "Expected HTTPS clone URL, got: {url}"
        )));
    }

    let url = url.to_string();
    let target = target.to_path_buf();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        RepoBuilder::new()
            .fetch_options(make_fetch_options(&token))
            .clone(&url, &target)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Clone task panicked: {e}")))?
}

/// Check out `branch`, tracking the remote branch when it exists and branching off HEAD otherwise.
///
/// Returns whether the branch already existed on the remote.
pub async fn checkout_remote_or_create(dir: &Path, branch_name: &str, token: &str) -> Result<bool> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        checkout_remote_or_create_blocking(&repo, &branch_name, &token)
    })
    .await
    .map_err(|e| AppError::Git(format!("Checkout task panicked: {e}")))?
}

fn checkout_remote_or_create_blocking(
    repo: &Repository,
    branch_name: &str,
    token: &str,
) -> Result<bool> {
    let head_ref = format!("refs/heads/{branch_name}");
    let mut remote = repo.find_remote("origin")?;

    let exists_remotely = {
        let connection = remote.connect_auth(Direction::Fetch, Some(make_callbacks(token)), None)?;
        let heads = connection.list()?;
        heads.iter().any(|head| head.name() == head_ref)
    };

    let commit = if exists_remotely {
        let refspec = format!("+{head_ref}:refs/remotes/origin/{branch_name}");
        let mut fetch_opts = make_fetch_options(token);
        remote.fetch(&[&refspec], Some(&mut fetch_opts), None)?;

        repo.find_reference(&format!("refs/remotes/origin/{branch_name}"))?
            .peel_to_commit()?
    } else {
        repo.head()?.peel_to_commit()?
    };

    repo.branch(branch_name, &commit, true)?;
    let obj = repo.revparse_single(&head_ref)?;
    repo.checkout_tree(&obj, None)?;
    repo.set_head(&head_ref)?;

    tracing::debug!(branch = branch_name, existing = exists_remotely, "Checked out branch");
    Ok(exists_remotely)
}

/// Stage everything, deletions included.
pub async fn add_all(dir: &Path) -> Result<()> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        add_all_blocking(&repo)
    })
    .await
    .map_err(|e| AppError::Git(format!("Add-all task panicked: {e}")))?
}

fn add_all_blocking(repo: &Repository) -> Result<()> {
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;
    Ok(())
}

/// Commit the index and return the new commit SHA.
pub async fn commit(dir: &Path, message: &str) -> Result<String> {
    let dir = dir.to_path_buf();
    let message = message.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        commit_blocking(&repo, &message)
    })
    .await
    .map_err(|e| AppError::Git(format!("Commit task panicked: {e}")))?
}

fn commit_blocking(repo: &Repository, message: &str) -> Result<String> {
    let sig = Signature::now(COMMIT_AUTHOR, COMMIT_EMAIL)?;
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    // Unborn HEAD in an empty repository has no parent
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    Ok(oid.to_string())
}

/// Push the branch to origin.
pub async fn push(dir: &Path, branch_name: &str, token: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");
        let mut push_opts = make_push_options(&token);
        remote.push(&[&refspec], Some(&mut push_opts))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Push task panicked: {e}")))?
}

/// Whether the working tree differs from HEAD.
pub async fn has_changes(dir: &Path) -> Result<bool> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let statuses = repo.statuses(None)?;
        Ok(!statuses.is_empty())
    })
    .await
    .map_err(|e| AppError::Git(format!("Has-changes task panicked: {e}")))?
}
