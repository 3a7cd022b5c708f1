//! Ignore-marker filtering.
//!
//! Repositories carrying a `.sweepignore` file at the resolved commit are
//! excluded from execution. The check fans out over repositories with
//! bounded concurrency and reports partial results plus an aggregate
//! error.

use crate::limit::parallel_map_limit;
use std::collections::HashSet;
use std::sync::Arc;
use sweep_core::ports::GitService;
use sweep_core::repo::Repo;
use sweep_core::workspace::RepoRevision;
use sweep_core::{Error, RepoId, Result};

/// Name of the per-repository ignore marker file.
pub const IGNORE_FILE_NAME: &str = ".sweepignore";

const IGNORE_CHECK_CONCURRENCY: usize = 5;

/// Determine which of the given repositories contain the ignore marker
/// file at their resolved commit.
///
/// Returns the (possibly partial) set of ignored repository IDs together
/// with an aggregate of all per-repository failures.
pub async fn find_ignored_repositories(
    git: Arc<dyn GitService>,
    repos: &[RepoRevision],
) -> (HashSet<RepoId>, Option<Error>) {
    let items: Vec<(Repo, String)> = repos
        .iter()
        .map(|r| (r.repo.clone(), r.commit.clone()))
        .collect();

    let (checked, errors) = parallel_map_limit(IGNORE_CHECK_CONCURRENCY, items, move |(repo, commit)| {
        let git = Arc::clone(&git);
        async move {
            let ignored = has_ignore_file(git.as_ref(), &repo, &commit).await?;
            Ok(ignored.then_some(repo.id))
        }
    })
    .await;

    let ignored = checked.into_iter().flatten().collect();
    (ignored, Error::aggregate(errors))
}

/// Check for the marker file. Absence is the not-ignored case; a present
/// but non-regular entry (directory, symlink) is a hard error naming the
/// path.
async fn has_ignore_file(git: &dyn GitService, repo: &Repo, commit: &str) -> Result<bool> {
    match git.stat(repo, commit, IGNORE_FILE_NAME).await? {
        None => Ok(false),
        Some(stat) if !stat.is_regular => Err(Error::NotABlob(stat.path)),
        Some(_) => Ok(true),
    }
}
