//! Workspace partitioning.
//!
//! Applies the batch spec's workspace configurations to the resolved
//! repositories: repositories matching a configuration glob get one
//! workspace per discovered directory containing the configuration's
//! root-marker file, everything else gets a single workspace at the
//! repository root.

use async_trait::async_trait;
use glob::Pattern;
use std::collections::HashMap;
use sweep_core::spec::{BatchSpec, Step};
use sweep_core::template::{BatchChangeAttributes, RepositoryContext, StepContext, is_static_bool};
use sweep_core::workspace::{RepoRevision, RepoWorkspace, WorkspaceKey};
use sweep_core::{Error, Result};

/// Locates, per repository, the directories containing a given file name
/// at the pinned commit. Paths are relative to the repository root, with
/// no leading slash; the root itself is the empty string.
#[async_trait]
pub trait DirectoryFinder: Send + Sync {
    async fn find_directories_in_repos(
        &self,
        file_name: &str,
        repos: Vec<RepoRevision>,
    ) -> (HashMap<WorkspaceKey, Vec<String>>, Option<Error>);
}

/// Match the resolved repositories against the spec's workspace
/// configurations and build the final workspace list, steps attached.
pub async fn find_workspaces(
    spec: &BatchSpec,
    finder: &dyn DirectoryFinder,
    repo_revs: &[RepoRevision],
) -> Result<Vec<RepoWorkspace>> {
    // Pre-compile all globs; report every bad pattern, not just the first.
    let mut matchers = Vec::with_capacity(spec.workspaces.len());
    let mut compile_errors = Vec::new();
    for conf in &spec.workspaces {
        match Pattern::new(&conf.in_) {
            Ok(pattern) => matchers.push(pattern),
            Err(err) => compile_errors.push(Error::Validation(format!(
                "failed to compile glob {:?}: {}",
                conf.in_, err
            ))),
        }
    }
    if let Some(err) = Error::aggregate(compile_errors) {
        return Err(err);
    }

    let mut root: Vec<RepoRevision> = Vec::new();
    // Workspace config index -> repositories matching its glob.
    let mut matched: HashMap<usize, Vec<RepoRevision>> = HashMap::new();

    for repo_rev in repo_revs {
        let mut found = false;

        for (idx, conf) in spec.workspaces.iter().enumerate() {
            if !matchers[idx].matches(&repo_rev.repo.name) {
                continue;
            }

            // A repository assigned to two configurations is ambiguous.
            if found {
                return Err(Error::Validation(format!(
                    "repository {} matches multiple workspaces.in globs in the batch spec. glob: {:?}",
                    repo_rev.repo.name, conf.in_
                )));
            }

            matched.entry(idx).or_default().push(repo_rev.clone());
            found = true;
        }

        if !found {
            root.push(repo_rev.clone());
        }
    }

    struct RepoPaths {
        repo_rev: RepoRevision,
        paths: Vec<String>,
        only_fetch_workspace: bool,
    }
    let mut by_key: HashMap<WorkspaceKey, RepoPaths> = HashMap::new();

    for idx in 0..spec.workspaces.len() {
        let Some(repos) = matched.remove(&idx) else {
            continue;
        };
        let conf = &spec.workspaces[idx];

        let mut revs_by_key: HashMap<WorkspaceKey, RepoRevision> =
            repos.iter().map(|r| (r.key(), r.clone())).collect();

        let (dirs_by_key, err) = finder
            .find_directories_in_repos(&conf.root_at_location_of, repos)
            .await;
        if let Some(err) = err {
            return Err(err);
        }

        for (key, dirs) in dirs_by_key {
            // Repositories without any matched directory produce no
            // workspace under this configuration.
            if dirs.is_empty() {
                continue;
            }
            if let Some(repo_rev) = revs_by_key.remove(&key) {
                by_key.insert(
                    key,
                    RepoPaths {
                        repo_rev,
                        paths: dirs,
                        only_fetch_workspace: conf.only_fetch_workspace,
                    },
                );
            }
        }
    }

    // Repositories matching no configuration execute at the root.
    for repo_rev in root {
        match by_key.get_mut(&repo_rev.key()) {
            Some(existing) => existing.paths.push(String::new()),
            None => {
                by_key.insert(
                    repo_rev.key(),
                    RepoPaths {
                        repo_rev,
                        paths: vec![String::new()],
                        only_fetch_workspace: false,
                    },
                );
            }
        }
    }

    let mut workspaces = Vec::new();
    for entry in by_key.into_values() {
        // One step list per repository, shared across all of its paths.
        let steps = steps_for_repo(
            spec,
            &entry.repo_rev.repo.name,
            &entry.repo_rev.file_matches,
        );

        for path in entry.paths {
            // Fetch-mode never applies at the repository root.
            let only_fetch_workspace = entry.only_fetch_workspace && !path.is_empty();

            workspaces.push(RepoWorkspace {
                repo_revision: entry.repo_rev.clone(),
                path,
                steps: steps.clone(),
                only_fetch_workspace,
                ignored: false,
                unsupported: false,
            });
        }
    }

    workspaces.sort_by(|a, b| {
        a.repo()
            .name
            .cmp(&b.repo().name)
            .then_with(|| a.path.cmp(&b.path))
    });

    Ok(workspaces)
}

/// The steps applicable to a repository: steps whose conditional is empty,
/// statically true, or not statically decidable.
pub fn steps_for_repo(spec: &BatchSpec, repo_name: &str, file_matches: &[String]) -> Vec<Step> {
    let mut task_steps = Vec::new();

    for step in &spec.steps {
        if step.if_condition().is_empty() {
            task_steps.push(step.clone());
            continue;
        }

        let ctx = StepContext {
            repository: RepositoryContext {
                name: repo_name.to_string(),
                file_matches: file_matches.to_vec(),
            },
            batch_change: BatchChangeAttributes {
                name: spec.name.clone(),
                description: spec.description.clone(),
            },
        };

        // Only a statically false conditional drops the step; dynamic
        // conditionals are re-evaluated at run time.
        match is_static_bool(step.if_condition(), &ctx) {
            Some(false) => {}
            Some(true) | None => task_steps.push(step.clone()),
        }
    }

    task_steps
}
