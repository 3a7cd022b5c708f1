//! Per-job logging with secret redaction.
//!
//! The logger must be supplied with every sensitive value that may appear
//! in a command or its output: the instance-wide redaction set plus the
//! job's own. Lines are scrubbed before they reach the log sink.

use std::collections::BTreeMap;
use std::sync::Arc;
use sweep_core::JobId;
use sweep_core::job::Job;
use sweep_core::ports::LogSink;

const REDACTED: &str = "***";

/// Redacting logger for one job.
pub struct JobLogger {
    sink: Arc<dyn LogSink>,
    job_id: JobId,
    redacted: Vec<String>,
}

impl JobLogger {
    /// Build the logger from the union of instance-level and job-level
    /// redacted values. Job-level values win on name collision, but every
    /// distinct secret value is scrubbed either way.
    pub fn new(sink: Arc<dyn LogSink>, job: &Job, instance_redacted: &BTreeMap<String, String>) -> Self {
        let merged = union(instance_redacted, &job.redacted_values);
        let mut redacted: Vec<String> = merged.into_values().filter(|v| !v.is_empty()).collect();
        // Longest first, so a secret that contains another is scrubbed
        // whole rather than leaving its suffix behind.
        redacted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        redacted.dedup();

        Self {
            sink,
            job_id: job.id,
            redacted,
        }
    }

    /// Append one line for a step, secrets scrubbed.
    pub fn log(&self, key: &str, line: &str) {
        self.sink.append(self.job_id, key, &self.redact(line));
    }

    pub fn flush(&self) {
        self.sink.flush(self.job_id);
    }

    fn redact(&self, line: &str) -> String {
        let mut out = line.to_string();
        for value in &self.redacted {
            out = out.replace(value, REDACTED);
        }
        out
    }
}

fn union(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut merged = a.clone();
    for (k, v) in b {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
