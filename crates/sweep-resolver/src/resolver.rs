//! The workspace resolver.
//!
//! Top-level entry point of workspace resolution: resolves the batch
//! spec's `on:` selectors to pinned repository revisions, filters ignored
//! repositories, partitions into workspaces and produces the final,
//! stably sorted list.

use crate::ignore::find_ignored_repositories;
use crate::limit::parallel_map_limit;
use crate::partition::{DirectoryFinder, find_workspaces};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use sweep_core::ports::{Actor, GitService, RepoStore, SearchClient};
use sweep_core::spec::{BatchSpec, OnSelector};
use sweep_core::workspace::{RepoRevision, RepoWorkspace, WorkspaceKey};
use sweep_core::{Error, RepoId, Result};
use tracing::{debug, info};

const DIRECTORY_DISCOVERY_CONCURRENCY: usize = 10;

/// Resolves a batch spec into the ordered list of workspaces work must
/// run on.
pub struct WorkspaceResolver {
    search: Arc<dyn SearchClient>,
    repo_store: Arc<dyn RepoStore>,
    git: Arc<dyn GitService>,
    actor: Actor,
}

impl WorkspaceResolver {
    pub fn new(
        search: Arc<dyn SearchClient>,
        repo_store: Arc<dyn RepoStore>,
        git: Arc<dyn GitService>,
        actor: Actor,
    ) -> Self {
        Self {
            search,
            repo_store,
            git,
            actor,
        }
    }

    /// Resolve every workspace the batch spec applies to, annotated with
    /// ignore/unsupported flags and sorted by (repo name, path, branch).
    pub async fn resolve_workspaces_for_batch_spec(
        &self,
        spec: &BatchSpec,
    ) -> Result<Vec<RepoWorkspace>> {
        // Find all repositories matching the spec's `on` selectors. The
        // list is permission-filtered by the repository store.
        let repos = self.determine_repositories(spec).await?;
        info!(batch_spec = %spec.name, repos = repos.len(), "Resolved repositories");

        // Next, the repositories opting out through an ignore file. Any
        // failed check is fatal to the whole resolution.
        let (ignored, ignore_err) = find_ignored_repositories(Arc::clone(&self.git), &repos).await;
        if let Some(err) = ignore_err {
            return Err(err);
        }

        let mut workspaces = find_workspaces(spec, self, &repos).await?;

        for ws in &mut workspaces {
            if !ws.repo().host_kind.supports_batch_changes() {
                ws.unsupported = true;
            }
            if ignored.contains(&ws.repo().id) {
                ws.ignored = true;
            }
        }

        // Deterministic output contract, independent of any intermediate
        // ordering.
        workspaces.sort_by(|a, b| {
            a.repo()
                .name
                .cmp(&b.repo().name)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.repo_revision.branch.cmp(&b.repo_revision.branch))
        });

        info!(batch_spec = %spec.name, workspaces = workspaces.len(), "Resolved workspaces");
        Ok(workspaces)
    }

    /// Resolve every `on` selector, deduplicating by repository ID with
    /// last-write-wins branch/commit. Selector failures are collected and
    /// surfaced as one aggregate error after all selectors were attempted.
    pub async fn determine_repositories(&self, spec: &BatchSpec) -> Result<Vec<RepoRevision>> {
        let mut seen: HashMap<RepoId, usize> = HashMap::new();
        let mut repo_revs: Vec<RepoRevision> = Vec::new();
        let mut errors: Vec<Error> = Vec::new();

        for on in &spec.on {
            let repos = match self.resolve_selector(on).await {
                Ok(repos) => repos,
                Err(err) => {
                    errors.push(err.context(format!("resolving {:?}", on.to_string())));
                    continue;
                }
            };

            for repo in repos {
                // Skip repos where no branch exists.
                if !repo.has_branch() {
                    continue;
                }

                match seen.get(&repo.repo.id) {
                    None => {
                        seen.insert(repo.repo.id, repo_revs.len());
                        repo_revs.push(repo);
                    }
                    Some(&idx) => {
                        // Later resolutions win for the same repository.
                        repo_revs[idx].branch = repo.branch;
                        repo_revs[idx].commit = repo.commit;
                    }
                }
            }
        }

        if let Some(err) = Error::aggregate(errors) {
            return Err(err);
        }
        Ok(repo_revs)
    }

    async fn resolve_selector(&self, on: &OnSelector) -> Result<Vec<RepoRevision>> {
        if !on.repositories_matching_query.is_empty() {
            return self
                .resolve_repositories_matching_query(&on.repositories_matching_query)
                .await;
        }

        if !on.repository.is_empty() && !on.branch.is_empty() {
            let repo = self
                .resolve_repository_name_and_branch(&on.repository, &on.branch)
                .await?;
            return Ok(vec![repo]);
        }

        if !on.repository.is_empty() {
            let repo = self.resolve_repository_name(&on.repository).await?;
            return Ok(vec![repo]);
        }

        // This shouldn't happen on any batch spec that has passed
        // validation, but, alas, software.
        Err(Error::MalformedSelector)
    }

    async fn resolve_repository_name(&self, name: &str) -> Result<RepoRevision> {
        let repo = self.repo_store.get_by_name(name).await?;
        // Directly resolved repos don't have any file matches.
        self.repo_to_revision_with_default_branch(repo, Vec::new())
            .await
    }

    async fn resolve_repository_name_and_branch(
        &self,
        name: &str,
        branch: &str,
    ) -> Result<RepoRevision> {
        let repo = self.repo_store.get_by_name(name).await?;

        let commit = match self.git.resolve_revision(&repo, branch).await {
            Ok(commit) => commit,
            Err(Error::RevisionNotFound { .. }) => {
                return Err(Error::NoMatchingBranch {
                    repo: name.to_string(),
                    branch: branch.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        Ok(RepoRevision {
            repo,
            branch: branch.to_string(),
            commit,
            // Directly resolved repos don't have any file matches.
            file_matches: Vec::new(),
        })
    }

    async fn resolve_repositories_matching_query(&self, query: &str) -> Result<Vec<RepoRevision>> {
        let query = set_default_query_count(query);
        debug!(query = %query, "Resolving repositories matching query");

        let mut repo_ids: Vec<RepoId> = Vec::new();
        let mut file_matches: HashMap<RepoId, BTreeSet<String>> = HashMap::new();

        self.search
            .search(&self.actor, &query, &mut |matches| {
                for m in matches {
                    let id = m.repository_id();
                    repo_ids.push(id);
                    if let Some(path) = m.path() {
                        file_matches.entry(id).or_default().insert(path.to_string());
                    }
                }
            })
            .await?;

        // The store call checks whether the user has access to the
        // repositories; the search request itself is impersonated for the
        // same reason.
        let accessible = self.repo_store.list(&repo_ids).await?;

        let mut revs = Vec::with_capacity(accessible.len());
        for repo in accessible {
            let matches: Vec<String> = file_matches
                .remove(&repo.id)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default();
            let rev = self
                .repo_to_revision_with_default_branch(repo, matches)
                .await?;
            revs.push(rev);
        }
        Ok(revs)
    }

    async fn repo_to_revision_with_default_branch(
        &self,
        repo: sweep_core::repo::Repo,
        file_matches: Vec<String>,
    ) -> Result<RepoRevision> {
        let (branch, commit) = self.git.default_branch(&repo).await?;
        Ok(RepoRevision {
            repo,
            branch,
            commit,
            file_matches,
        })
    }
}

#[async_trait]
impl DirectoryFinder for WorkspaceResolver {
    /// Locate, per repository, the directories containing `file_name` at
    /// the pinned commit, with bounded request concurrency. A root match
    /// is normalized to the empty string.
    async fn find_directories_in_repos(
        &self,
        file_name: &str,
        repos: Vec<RepoRevision>,
    ) -> (HashMap<WorkspaceKey, Vec<String>>, Option<Error>) {
        let search = Arc::clone(&self.search);
        let actor = self.actor.clone();
        let file_name = file_name.to_string();

        let (found, errors) = parallel_map_limit(
            DIRECTORY_DISCOVERY_CONCURRENCY,
            repos,
            move |repo_rev: RepoRevision| {
                let search = Arc::clone(&search);
                let actor = actor.clone();
                let file_name = file_name.clone();
                async move {
                    let dirs =
                        find_directories_in_repo(search.as_ref(), &actor, &file_name, &repo_rev)
                            .await?;
                    Ok((repo_rev.key(), dirs))
                }
            },
        )
        .await;

        (found.into_iter().collect(), Error::aggregate(errors))
    }
}

async fn find_directories_in_repo(
    search: &dyn SearchClient,
    actor: &Actor,
    file_name: &str,
    repo_rev: &RepoRevision,
) -> Result<Vec<String>> {
    let query = format!(
        "file:(^|/){}$ repo:^{}$@{} type:path count:99999",
        regex::escape(file_name),
        regex::escape(&repo_rev.repo.name),
        repo_rev.commit,
    );

    let mut results: Vec<String> = Vec::new();
    search
        .search(actor, &query, &mut |matches| {
            for m in matches {
                if let sweep_core::search::SearchMatch::Path { path, .. } = m {
                    results.push(parent_directory(&path));
                }
            }
        })
        .await?;

    Ok(results)
}

/// Containing directory of a path, using forward slashes regardless of
/// host platform since the result addresses files inside containers. The
/// repository root is the empty string, never ".".
fn parent_directory(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _file)) => dir.to_string(),
        None => String::new(),
    }
}

const DEFAULT_QUERY_COUNT: &str = " count:all";

/// Default a `count:` directive onto the query so result sets are never
/// silently truncated. Queries that already carry one are left alone.
pub fn set_default_query_count(query: &str) -> String {
    let re = Regex::new(r"\bcount:(\d+|all)\b").unwrap();
    if re.is_match(query) {
        return query.to_string();
    }
    format!("{query}{DEFAULT_QUERY_COUNT}")
}
