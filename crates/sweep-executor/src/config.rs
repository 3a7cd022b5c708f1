//! Executor configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration of one executor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Prefix of every VM name created by this instance. Differentiates
    /// VMs of this executor from another one on the same host.
    #[serde(default = "default_vm_prefix")]
    pub vm_prefix: String,
    /// Directory under which per-job working directories are created.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Hard wall-clock ceiling for one job, in seconds.
    #[serde(default = "default_max_runtime")]
    pub maximum_runtime_per_job_secs: u64,
    /// Maximum number of jobs handled concurrently by this instance.
    #[serde(default = "default_num_handlers")]
    pub num_handlers: usize,
    /// Whether steps run inside isolated VMs. When disabled, the
    /// admission check always allows dequeueing.
    #[serde(default)]
    pub use_firecracker: bool,
    /// Instance-wide values to redact from all job logs, merged with the
    /// per-job redaction set.
    #[serde(default)]
    pub redacted_values: BTreeMap<String, String>,
}

fn default_vm_prefix() -> String {
    "sweep-executor".to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/sweep-executor")
}

fn default_max_runtime() -> u64 {
    1800
}

fn default_num_handlers() -> usize {
    1
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            vm_prefix: default_vm_prefix(),
            scratch_dir: default_scratch_dir(),
            maximum_runtime_per_job_secs: default_max_runtime(),
            num_handlers: default_num_handlers(),
            use_firecracker: false,
            redacted_values: BTreeMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn maximum_runtime_per_job(&self) -> Duration {
        Duration::from_secs(self.maximum_runtime_per_job_secs)
    }
}
