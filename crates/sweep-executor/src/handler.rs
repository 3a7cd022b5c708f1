//! The job handler.
//!
//! Takes one dequeued job from workspace preparation through VM setup,
//! step execution and teardown. Teardown and name-set bookkeeping run on
//! every exit path once setup has succeeded; a VM whose setup failed is
//! reclaimed by the janitor instead.

use crate::config::ExecutorConfig;
use crate::logger::JobLogger;
use crate::names::NameSet;
use crate::workspace::{Workspace, prepare_workspace};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use sweep_core::job::Job;
use sweep_core::ports::{HostRunner, LogSink, RunSpec, VmRuntime, VmRuntimeProvider};
use sweep_core::{Error, Result};
use tokio::time::Instant;
use uuid::Uuid;

pub struct Handler {
    config: ExecutorConfig,
    name_set: Arc<NameSet>,
    runtime: Arc<dyn VmRuntimeProvider>,
    host: Arc<dyn HostRunner>,
    sink: Arc<dyn LogSink>,
}

impl Handler {
    pub fn new(
        config: ExecutorConfig,
        name_set: Arc<NameSet>,
        runtime: Arc<dyn VmRuntimeProvider>,
        host: Arc<dyn HostRunner>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config,
            name_set,
            runtime,
            host,
            sink,
        }
    }

    /// Admission check run before dequeueing. When VM isolation is on and
    /// more VMs carry this instance's prefix than it has handlers, some of
    /// them are orphans from a previous run; refuse new work until the
    /// janitor has reclaimed them.
    pub async fn pre_dequeue(&self) -> Result<bool> {
        if !self.config.use_firecracker {
            return Ok(true);
        }

        let running = self.runtime.list_running(&self.config.vm_prefix).await?;
        if running.len() < self.config.num_handlers {
            return Ok(true);
        }

        tracing::warn!(
            num_running = running.len(),
            num_handlers = self.config.num_handlers,
            "found orphaned virtual machines, refusing to dequeue"
        );
        Ok(false)
    }

    /// Execute one job to completion. Log lines are flushed whatever the
    /// outcome.
    pub async fn handle(&self, job: &Job) -> Result<()> {
        tracing::info!(job_id = %job.record_id(), repository = %job.repository_name, "handling job");

        let logger = JobLogger::new(
            Arc::clone(&self.sink),
            job,
            &self.config.redacted_values,
        );
        let result = self.handle_with_logger(job, &logger).await;
        logger.flush();
        result
    }

    async fn handle_with_logger(&self, job: &Job, logger: &JobLogger) -> Result<()> {
        // The deadline covers the whole job, clone and file writes included.
        let max = self.config.maximum_runtime_per_job();
        let deadline = Instant::now() + max;

        let workspace = with_deadline(
            deadline,
            max,
            "failed to prepare workspace",
            prepare_workspace(&self.config.scratch_dir, &self.host, job),
        )
        .await?;

        let name = format!("{}-{}", self.config.vm_prefix, Uuid::new_v4());
        let reservation = self.name_set.reserve(&name);
        let vm = self.runtime.create(workspace.path(), reservation.name());

        // Teardown only applies once setup succeeded; a half-provisioned
        // VM is reclaimed by name through the janitor.
        with_deadline(deadline, max, "failed to setup virtual machine", async {
            vm.setup(&docker_images(job)).await
        })
        .await?;

        let steps = self
            .run_steps(&*vm, job, &workspace, logger, deadline, max)
            .await;
        let teardown = vm
            .teardown()
            .await
            .map_err(|e| e.context("failed to teardown virtual machine"));

        match (steps, teardown) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(err), Err(teardown_err)) => Err(Error::Aggregate(vec![err, teardown_err])),
        }
    }

    async fn run_steps(
        &self,
        vm: &dyn VmRuntime,
        job: &Job,
        workspace: &Workspace,
        logger: &JobLogger,
        deadline: Instant,
        max: Duration,
    ) -> Result<()> {
        for (i, step) in job.docker_steps.iter().enumerate() {
            let key = format!("step.docker.{i}");
            logger.log(&key, &format!("running docker step in image {}", step.image));

            let spec = RunSpec {
                key,
                image: Some(step.image.clone()),
                command: Vec::new(),
                script_path: Some(workspace.script_paths()[i].clone()),
                dir: step.dir.clone(),
                env: step.env.clone(),
            };
            with_deadline(deadline, max, "failed to perform docker step", vm.run(spec)).await?;
        }

        for (i, step) in job.cli_steps.iter().enumerate() {
            let key = format!("step.sweep.{i}");
            let mut command = vec!["sweep".to_string()];
            command.extend(step.commands.iter().cloned());
            logger.log(&key, &command.join(" "));

            let spec = RunSpec {
                key,
                image: None,
                command,
                script_path: None,
                dir: step.dir.clone(),
                env: step.env.clone(),
            };
            with_deadline(deadline, max, "failed to perform sweep step", vm.run(spec)).await?;
        }

        Ok(())
    }
}

/// Images referenced by the job's docker steps, deduplicated and sorted.
fn docker_images(job: &Job) -> Vec<String> {
    let images: std::collections::BTreeSet<&String> =
        job.docker_steps.iter().map(|s| &s.image).collect();
    images.into_iter().cloned().collect()
}

/// Run one phase of the job against the job's shared wall-clock deadline.
async fn with_deadline<T, F>(deadline: Instant, max: Duration, context: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result.map_err(|e| e.context(context)),
        Err(_) => Err(Error::JobTimeout(max).context(context)),
    }
}
