//! Script materialization for containerized steps.
//!
//! Each docker step's shell commands are rendered into a script file that
//! is mounted into the step's container. File names are derived from the
//! job, step index, repository and commit so concurrent jobs sharing a
//! host filesystem never collide.

use sweep_core::job::{DockerStep, Job};

/// Directory inside the working directory holding the rendered scripts.
pub const SCRIPTS_DIR: &str = ".sweep-executor";

/// Enables command echo so every executed command shows up in the log.
const SCRIPT_PREAMBLE: &str = "set -x";

/// Render one docker step into script contents.
pub fn build_script(step: &DockerStep) -> String {
    let mut script = String::from(SCRIPT_PREAMBLE);
    script.push('\n');
    for command in &step.commands {
        script.push('\n');
        script.push_str(command);
    }
    script.push('\n');
    script
}

/// Deterministic, collision-free script file name for one step of a job.
pub fn script_name(job: &Job, step_index: usize) -> String {
    format!(
        "{}.{}_{}@{}.sh",
        job.id,
        step_index,
        job.repository_name.replace('/', "_"),
        job.commit,
    )
}
