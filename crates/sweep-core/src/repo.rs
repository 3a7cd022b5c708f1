//! Repository identity and code-host metadata.

use crate::ids::RepoId;
use serde::{Deserialize, Serialize};

/// Kind of code host a repository lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeHostKind {
    GitHub,
    GitLab,
    BitbucketServer,
    BitbucketCloud,
    Other,
}

impl CodeHostKind {
    /// Whether batch changes can open changesets against this host kind.
    pub fn supports_batch_changes(&self) -> bool {
        matches!(
            self,
            CodeHostKind::GitHub | CodeHostKind::GitLab | CodeHostKind::BitbucketServer
        )
    }
}

/// A repository as known to the repository store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    pub host_kind: CodeHostKind,
}

impl Repo {
    pub fn new(id: RepoId, name: impl Into<String>, host_kind: CodeHostKind) -> Self {
        Self {
            id,
            name: name.into(),
            host_kind,
        }
    }
}
