//! Per-job workspace preparation.
//!
//! Each job gets a fresh working directory under the executor's scratch
//! directory. The target repository is cloned into it, the job's virtual
//! files are materialized, and the step scripts are written out. The
//! directory is removed when the guard drops, on every exit path.

use crate::scripts::{SCRIPTS_DIR, build_script, script_name};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use sweep_core::job::Job;
use sweep_core::ports::HostRunner;
use sweep_core::{Error, Result};
use uuid::Uuid;

/// A prepared job workspace. Removing the working directory is tied to
/// the guard's lifetime.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    /// Script paths relative to the working directory, one per docker
    /// step, in step order.
    script_paths: Vec<PathBuf>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn script_paths(&self) -> &[PathBuf] {
        &self.script_paths
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove workspace");
        }
    }
}

/// Create and populate the working directory for a job.
pub async fn prepare_workspace(
    scratch_dir: &Path,
    host: &Arc<dyn HostRunner>,
    job: &Job,
) -> Result<Workspace> {
    let path = scratch_dir.join(format!("job-{}-{}", job.id, Uuid::new_v4()));
    std::fs::create_dir_all(&path)?;
    let workspace = Workspace {
        path,
        script_paths: Vec::new(),
    };
    populate(host, job, workspace).await
}

async fn populate(host: &Arc<dyn HostRunner>, job: &Job, mut workspace: Workspace) -> Result<Workspace> {
    if !job.repository_name.is_empty() {
        host.clone_repository(&job.repository_name, &job.commit, workspace.path())
            .await
            .map_err(|e| e.context("failed to clone repository"))?;
    }

    write_virtual_files(workspace.path(), job)?;
    workspace.script_paths = write_scripts(workspace.path(), job)?;
    Ok(workspace)
}

/// Materialize the job's named files into the working directory. Paths
/// are resolved lexically and must stay inside the directory.
fn write_virtual_files(workdir: &Path, job: &Job) -> Result<()> {
    for (name, contents) in &job.virtual_machine_files {
        let relative = normalize_within(name)?;
        let target = workdir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, contents)?;
    }
    Ok(())
}

fn write_scripts(workdir: &Path, job: &Job) -> Result<Vec<PathBuf>> {
    let dir = workdir.join(SCRIPTS_DIR);
    if !job.docker_steps.is_empty() {
        std::fs::create_dir_all(&dir)?;
    }
    let mut paths = Vec::with_capacity(job.docker_steps.len());
    for (i, step) in job.docker_steps.iter().enumerate() {
        let relative = Path::new(SCRIPTS_DIR).join(script_name(job, i));
        std::fs::write(workdir.join(&relative), build_script(step))?;
        paths.push(relative);
    }
    Ok(paths)
}

/// Lexically normalize a user-supplied relative path, rejecting anything
/// that is absolute or climbs above its root.
fn normalize_within(path: &str) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::PathTraversal(path.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathTraversal(path.to_string()));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(Error::PathTraversal(path.to_string()));
    }
    Ok(normalized)
}
