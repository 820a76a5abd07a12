use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, Result};

static OWNER_REPO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid regex"));

/// Normalize a repository reference to `owner/repo`.
///
/// Accepts `owner/repo`, `https://github.com/owner/repo`, URLs with trailing paths such as
/// `/tree/main/src`, scheme-less `github.com/owner/repo` and `git@github.com:owner/repo.git`.
pub fn normalize_repo(input: &str) -> Result<String> {
    let repo = input.trim();
    if repo.is_empty() {
        return Err(AppError::InvalidRepository(
            "repository must not be empty".to_string(),
        ));
    }

    if OWNER_REPO.is_match(repo) {
        return Ok(repo.to_string());
    }

    let without_scheme = repo.split_once("://").map_or(repo, |(_, rest)| rest);
    let without_www = without_scheme
        .strip_prefix("www.")
        .or_else(|| without_scheme.strip_prefix("WWW."))
        .unwrap_or(without_scheme);

    let path = match without_www.split_once("github.com") {
        Some((_, rest)) => rest.trim_start_matches(':').trim_matches('/'),
        None => {
            return Err(AppError::InvalidRepository(format!(
                "cannot extract owner/repo from '{input}'; use owner/repo or https://github.com/owner/repo"
            )))
        }
    };

    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(name)) => {
            let name = name.strip_suffix(".git").unwrap_or(name);
            let normalized = format!("{owner}/{name}");
            if OWNER_REPO.is_match(&normalized) {
                Ok(normalized)
            } else {
                Err(AppError::InvalidRepository(format!(
                    "'{normalized}' is not a valid owner/repo"
                )))
            }
        }
        (Some(_), None) => Err(AppError::InvalidRepository(format!(
            "'{input}' names only an owner; expected owner/repo"
        ))),
        _ => Err(AppError::InvalidRepository(format!(
            "cannot extract owner/repo from '{input}'"
        ))),
    }
}

/// Split `owner/repo` into its two halves.
pub fn split_repo(repo_full_name: &str) -> Result<(&str, &str)> {
    match repo_full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(AppError::InvalidRepository(format!(
            "Invalid repo name: {repo_full_name}"
        ))),
    }
}
