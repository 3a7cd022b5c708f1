//! Resolved repository revisions and workspaces.

use crate::ids::RepoId;
use crate::repo::Repo;
use crate::spec::Step;
use serde::{Deserialize, Serialize};

/// A repository on a branch at a fixed revision.
///
/// Identity for deduplication is the repository ID; re-resolving the same
/// repository overwrites branch and commit with the latest observed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRevision {
    pub repo: Repo,
    /// Empty when the repository had no resolvable branch.
    pub branch: String,
    pub commit: String,
    /// File paths that matched the triggering search query, sorted.
    /// Empty for directly-named repositories.
    pub file_matches: Vec<String>,
}

impl RepoRevision {
    pub fn has_branch(&self) -> bool {
        !self.branch.is_empty()
    }

    pub fn key(&self) -> WorkspaceKey {
        WorkspaceKey {
            repo_id: self.repo.id,
            branch: self.branch.clone(),
            commit: self.commit.clone(),
        }
    }
}

/// Deduplication key across resolution stages: two revisions with equal
/// keys are the same workspace target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceKey {
    pub repo_id: RepoId,
    pub branch: String,
    pub commit: String,
}

/// A directory within a repository at a pinned commit where a subset of
/// the batch spec's steps execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoWorkspace {
    pub repo_revision: RepoRevision,
    /// Path relative to the repository root. Empty string means root;
    /// "." is never used internally.
    pub path: String,
    /// Steps applicable to this workspace, in declaration order.
    pub steps: Vec<Step>,
    /// Fetch only the workspace subdirectory rather than the full repo.
    pub only_fetch_workspace: bool,
    /// An ignore-marker file is present at the resolved commit.
    pub ignored: bool,
    /// The hosting code host does not support batch changes.
    pub unsupported: bool,
}

impl RepoWorkspace {
    pub fn repo(&self) -> &Repo {
        &self.repo_revision.repo
    }
}
