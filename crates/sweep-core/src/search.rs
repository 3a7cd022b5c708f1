//! Typed events of the streaming search protocol.
//!
//! The search backend streams server-sent events; the `matches` event
//! carries a batch of typed match objects, dispatched through a single
//! tagged enum.

use crate::ids::RepoId;
use serde::{Deserialize, Serialize};

/// One match object from a `matches` event. The protocol spells the
/// repository ID field `repositoryID`, not camel case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SearchMatch {
    #[serde(rename = "repo")]
    Repo {
        #[serde(rename = "repositoryID")]
        repository_id: i32,
        repository: String,
    },
    #[serde(rename = "content")]
    Content {
        #[serde(rename = "repositoryID")]
        repository_id: i32,
        repository: String,
        path: String,
    },
    #[serde(rename = "path")]
    Path {
        #[serde(rename = "repositoryID")]
        repository_id: i32,
        repository: String,
        path: String,
    },
    #[serde(rename = "symbol")]
    Symbol {
        #[serde(rename = "repositoryID")]
        repository_id: i32,
        repository: String,
        path: String,
    },
}

impl SearchMatch {
    pub fn repository_id(&self) -> RepoId {
        match self {
            SearchMatch::Repo { repository_id, .. }
            | SearchMatch::Content { repository_id, .. }
            | SearchMatch::Path { repository_id, .. }
            | SearchMatch::Symbol { repository_id, .. } => RepoId(*repository_id),
        }
    }

    /// The matched file path; repo matches have none.
    pub fn path(&self) -> Option<&str> {
        match self {
            SearchMatch::Repo { .. } => None,
            SearchMatch::Content { path, .. }
            | SearchMatch::Path { path, .. }
            | SearchMatch::Symbol { path, .. } => Some(path),
        }
    }
}

/// An `error` event terminating the stream with a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchError {
    pub message: String,
}

/// A `progress` event. Only acknowledged; skipped-result reporting is not
/// evaluated by the resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProgress {
    #[serde(default)]
    pub match_count: u64,
    #[serde(default)]
    pub done: bool,
}
