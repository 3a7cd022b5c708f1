//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the execution core and its
//! external collaborators: the search backend, the repository store, the
//! version-control layer, the VM runtime, and the log store. Tests inject
//! in-memory implementations.

use crate::error::Result;
use crate::ids::{JobId, RepoId};
use crate::repo::Repo;
use crate::search::SearchMatch;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The user on whose behalf a request runs. Search requests are
/// impersonated and permission-scoped to this user.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub uid: String,
}

impl Actor {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.uid.is_empty()
    }
}

/// Streaming match source. Implementations decode the event stream
/// incrementally and invoke `on_matches` once per decoded batch.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run a search as `actor`, feeding every decoded match batch to
    /// `on_matches`. Fails when the actor is not authenticated.
    async fn search(
        &self,
        actor: &Actor,
        query: &str,
        on_matches: &mut (dyn FnMut(Vec<SearchMatch>) + Send),
    ) -> Result<()>;
}

/// Permission-filtered repository lookups.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// Get a repository by name; `Error::RepoNotFound` when absent.
    async fn get_by_name(&self, name: &str) -> Result<Repo>;

    /// List repositories by ID, filtered to those the requesting user can
    /// access. Unknown or inaccessible IDs are silently omitted.
    async fn list(&self, ids: &[RepoId]) -> Result<Vec<Repo>>;
}

/// Metadata of a file at a pinned commit.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub path: String,
    pub is_regular: bool,
}

/// Version-control plumbing: branch/commit resolution and file stat.
#[async_trait]
pub trait GitService: Send + Sync {
    /// Resolve the default branch of a repository to `(branch, commit)`.
    /// An empty repository yields an empty branch name.
    async fn default_branch(&self, repo: &Repo) -> Result<(String, String)>;

    /// Resolve a ref to a commit; `Error::RevisionNotFound` when the ref
    /// does not exist.
    async fn resolve_revision(&self, repo: &Repo, rev: &str) -> Result<String>;

    /// Stat a path at a commit; `Ok(None)` when the path does not exist.
    async fn stat(&self, repo: &Repo, commit: &str, path: &str) -> Result<Option<FileStat>>;
}

/// Specification of one step executed inside the job's environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSpec {
    /// Stable key identifying the step in logs, e.g. `step.docker.0`.
    pub key: String,
    /// Container image; `None` for CLI steps run directly.
    pub image: Option<String>,
    /// Command to invoke for CLI steps.
    pub command: Vec<String>,
    /// Script to execute for containerized steps, relative to the
    /// working directory.
    pub script_path: Option<PathBuf>,
    /// Working directory relative to the workspace root.
    pub dir: String,
    pub env: BTreeMap<String, String>,
}

/// An isolated, ephemeral execution environment for one job. Opaque to
/// the core beyond setup, run and teardown.
#[async_trait]
pub trait VmRuntime: Send + Sync {
    /// Provision the environment, pre-pulling the given images.
    async fn setup(&self, images: &[String]) -> Result<()>;

    /// Run one step to completion.
    async fn run(&self, spec: RunSpec) -> Result<()>;

    /// Tear the environment down. Must be safe to call after a failed or
    /// aborted step.
    async fn teardown(&self) -> Result<()>;
}

/// Creates per-job runtimes and answers liveness queries for the
/// admission check.
#[async_trait]
pub trait VmRuntimeProvider: Send + Sync {
    /// Create a runtime named `name` operating on `workdir`.
    fn create(&self, workdir: &Path, name: &str) -> Arc<dyn VmRuntime>;

    /// Names of currently live environments whose name starts with
    /// `prefix`.
    async fn list_running(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Runs commands directly on the host, outside any isolation. Used only
/// for workspace preparation (cloning the target repository).
#[async_trait]
pub trait HostRunner: Send + Sync {
    /// Clone `repo_name` at `commit` into `dir`.
    async fn clone_repository(&self, repo_name: &str, commit: &str, dir: &Path) -> Result<()>;
}

/// Destination for redacted job log lines.
pub trait LogSink: Send + Sync {
    /// Append one already-redacted line for a job step.
    fn append(&self, job_id: JobId, key: &str, line: &str);

    /// Flush any buffered lines for the job.
    fn flush(&self, job_id: JobId);
}
