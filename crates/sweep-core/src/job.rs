//! The dequeued execution job record.

use crate::ids::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of execution, created by the outer queue and consumed exactly
/// once by the job handler. The handler never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Repository to clone into the job workspace; empty means no clone.
    pub repository_name: String,
    pub commit: String,
    /// Containerized steps, run first, in order.
    #[serde(default)]
    pub docker_steps: Vec<DockerStep>,
    /// CLI-tool steps, run after the docker steps, in order.
    #[serde(default)]
    pub cli_steps: Vec<CliStep>,
    /// Named file contents materialized into the workspace before any
    /// step runs. Keys are paths relative to the working directory.
    #[serde(default)]
    pub virtual_machine_files: BTreeMap<String, String>,
    /// Environment values that must never appear in logged output.
    #[serde(default)]
    pub redacted_values: BTreeMap<String, String>,
}

impl Job {
    /// Identity of the underlying queue record.
    pub fn record_id(&self) -> JobId {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerStep {
    pub image: String,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliStep {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
