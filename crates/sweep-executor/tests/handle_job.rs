//! End-to-end tests of the job handler against in-memory fakes.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sweep_core::job::{CliStep, DockerStep, Job};
use sweep_core::ports::{HostRunner, LogSink, RunSpec, VmRuntime, VmRuntimeProvider};
use sweep_core::{Error, JobId, Result};
use sweep_executor::config::ExecutorConfig;
use sweep_executor::names::NameSet;
use sweep_executor::Handler;

#[derive(Default)]
struct RecordingRuntime {
    setups: Mutex<Vec<Vec<String>>>,
    runs: Mutex<Vec<RunSpec>>,
    teardowns: AtomicUsize,
    fail_setup: bool,
    fail_run_key: Option<String>,
    fail_teardown: bool,
    run_delay: Option<Duration>,
}

#[async_trait]
impl VmRuntime for RecordingRuntime {
    async fn setup(&self, images: &[String]) -> Result<()> {
        self.setups.lock().unwrap().push(images.to_vec());
        if self.fail_setup {
            return Err(Error::Internal("no space left on device".into()));
        }
        Ok(())
    }

    async fn run(&self, spec: RunSpec) -> Result<()> {
        let key = spec.key.clone();
        self.runs.lock().unwrap().push(spec);
        if let Some(delay) = self.run_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_run_key.as_deref() == Some(&key) {
            return Err(Error::StepFailed {
                exit_code: 1,
                message: "command exited non-zero".into(),
            });
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown {
            return Err(Error::Internal("vm already gone".into()));
        }
        Ok(())
    }
}

struct FakeProvider {
    vm: Arc<RecordingRuntime>,
    created: Mutex<Vec<String>>,
    running: Vec<String>,
}

impl FakeProvider {
    fn new(vm: Arc<RecordingRuntime>) -> Self {
        Self {
            vm,
            created: Mutex::new(Vec::new()),
            running: Vec::new(),
        }
    }
}

#[async_trait]
impl VmRuntimeProvider for FakeProvider {
    fn create(&self, _workdir: &Path, name: &str) -> Arc<dyn VmRuntime> {
        self.created.lock().unwrap().push(name.to_string());
        self.vm.clone()
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .running
            .iter()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeHost {
    clones: Mutex<Vec<(String, String, PathBuf)>>,
}

struct SlowHost {
    delay: Duration,
}

#[async_trait]
impl HostRunner for SlowHost {
    async fn clone_repository(&self, _repo_name: &str, _commit: &str, _dir: &Path) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[async_trait]
impl HostRunner for FakeHost {
    async fn clone_repository(&self, repo_name: &str, commit: &str, dir: &Path) -> Result<()> {
        self.clones
            .lock()
            .unwrap()
            .push((repo_name.to_string(), commit.to_string(), dir.to_path_buf()));
        Ok(())
    }
}

#[derive(Default)]
struct VecSink {
    lines: Mutex<Vec<(JobId, String, String)>>,
    flushes: Mutex<Vec<JobId>>,
}

impl LogSink for VecSink {
    fn append(&self, job_id: JobId, key: &str, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((job_id, key.to_string(), line.to_string()));
    }

    fn flush(&self, job_id: JobId) {
        self.flushes.lock().unwrap().push(job_id);
    }
}

struct Harness {
    handler: Handler,
    vm: Arc<RecordingRuntime>,
    provider: Arc<FakeProvider>,
    host: Arc<FakeHost>,
    sink: Arc<VecSink>,
    name_set: Arc<NameSet>,
    _scratch: tempfile::TempDir,
}

fn harness(vm: RecordingRuntime, config: ExecutorConfig) -> Harness {
    let scratch = tempfile::tempdir().unwrap();
    let config = ExecutorConfig {
        scratch_dir: scratch.path().to_path_buf(),
        ..config
    };
    let vm = Arc::new(vm);
    let provider = Arc::new(FakeProvider::new(vm.clone()));
    let host = Arc::new(FakeHost::default());
    let sink = Arc::new(VecSink::default());
    let name_set = Arc::new(NameSet::new());
    let handler = Handler::new(
        config,
        name_set.clone(),
        provider.clone(),
        host.clone(),
        sink.clone(),
    );
    Harness {
        handler,
        vm,
        provider,
        host,
        sink,
        name_set,
        _scratch: scratch,
    }
}

fn job() -> Job {
    let mut env = BTreeMap::new();
    env.insert("GOFLAGS".to_string(), "-mod=mod".to_string());
    Job {
        id: JobId(51),
        repository_name: "github.com/foo/bar".into(),
        commit: "d34db33f".into(),
        docker_steps: vec![
            DockerStep {
                image: "golang:1.22".into(),
                commands: vec!["go mod tidy".into()],
                dir: String::new(),
                env,
            },
            DockerStep {
                image: "alpine:3".into(),
                commands: vec!["cat go.mod".into()],
                ..Default::default()
            },
        ],
        cli_steps: vec![CliStep {
            commands: vec!["apply".into(), "-f".into(), "spec.yaml".into()],
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_runs_all_steps_in_order_and_tears_down() {
    let h = harness(RecordingRuntime::default(), ExecutorConfig::default());

    h.handler.handle(&job()).await.unwrap();

    // Setup pre-pulls the deduplicated, sorted image list.
    let setups = h.vm.setups.lock().unwrap();
    assert_eq!(setups.as_slice(), [vec!["alpine:3".to_string(), "golang:1.22".to_string()]]);

    let runs = h.vm.runs.lock().unwrap();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].key, "step.docker.0");
    assert_eq!(runs[0].image.as_deref(), Some("golang:1.22"));
    assert_eq!(
        runs[0].script_path.as_deref(),
        Some(Path::new(".sweep-executor/51.0_github.com_foo_bar@d34db33f.sh"))
    );
    assert_eq!(runs[1].key, "step.docker.1");
    assert_eq!(runs[2].key, "step.sweep.0");
    assert_eq!(runs[2].command, vec!["sweep", "apply", "-f", "spec.yaml"]);
    assert_eq!(runs[2].image, None);

    assert_eq!(h.vm.teardowns.load(Ordering::SeqCst), 1);
    assert!(h.name_set.is_empty());
    assert_eq!(h.host.clones.lock().unwrap().len(), 1);
    assert_eq!(h.sink.flushes.lock().unwrap().as_slice(), [JobId(51)]);
}

#[tokio::test]
async fn test_vm_name_carries_prefix_and_is_reserved_during_run() {
    let h = harness(RecordingRuntime::default(), ExecutorConfig::default());

    h.handler.handle(&job()).await.unwrap();

    let created = h.provider.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("sweep-executor-"));
    // Released again once the job is done.
    assert!(h.name_set.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_long_step_and_tears_down() {
    let vm = RecordingRuntime {
        run_delay: Some(Duration::from_secs(3600)),
        ..Default::default()
    };
    let h = harness(vm, ExecutorConfig::default());

    let err = h.handler.handle(&job()).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("failed to perform docker step"));
    assert!(err.to_string().contains("1800s"));
    assert_eq!(h.vm.teardowns.load(Ordering::SeqCst), 1);
    assert!(h.name_set.is_empty());
}

#[tokio::test]
async fn test_step_failure_still_tears_down() {
    let vm = RecordingRuntime {
        fail_run_key: Some("step.docker.1".into()),
        ..Default::default()
    };
    let h = harness(vm, ExecutorConfig::default());

    let err = h.handler.handle(&job()).await.unwrap_err();

    assert!(err.to_string().contains("failed to perform docker step"));
    assert!(err.to_string().contains("exit code 1"));
    // The failing step halts the job; the CLI step never runs.
    assert_eq!(h.vm.runs.lock().unwrap().len(), 2);
    assert_eq!(h.vm.teardowns.load(Ordering::SeqCst), 1);
    assert!(h.name_set.is_empty());
}

#[tokio::test]
async fn test_step_and_teardown_failures_are_both_reported() {
    let vm = RecordingRuntime {
        fail_run_key: Some("step.docker.0".into()),
        fail_teardown: true,
        ..Default::default()
    };
    let h = harness(vm, ExecutorConfig::default());

    let err = h.handler.handle(&job()).await.unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("failed to perform docker step"));
    assert!(msg.contains("failed to teardown virtual machine"));
}

#[tokio::test]
async fn test_setup_failure_skips_teardown() {
    let vm = RecordingRuntime {
        fail_setup: true,
        ..Default::default()
    };
    let h = harness(vm, ExecutorConfig::default());

    let err = h.handler.handle(&job()).await.unwrap_err();

    assert!(err.to_string().contains("failed to setup virtual machine"));
    assert_eq!(h.vm.teardowns.load(Ordering::SeqCst), 0);
    assert!(h.name_set.is_empty());
}

#[tokio::test]
async fn test_traversal_in_virtual_files_fails_before_any_vm() {
    let h = harness(RecordingRuntime::default(), ExecutorConfig::default());

    let mut job = job();
    job.virtual_machine_files
        .insert("../../etc/crontab".into(), "boom".into());

    let err = h.handler.handle(&job).await.unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("failed to prepare workspace"), "got: {msg}");
    assert!(msg.contains("refusing to write outside"), "got: {msg}");
    assert!(h.provider.created.lock().unwrap().is_empty());
    assert_eq!(h.vm.setups.lock().unwrap().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_covers_workspace_preparation() {
    let h = harness(RecordingRuntime::default(), ExecutorConfig::default());
    let handler = Handler::new(
        ExecutorConfig {
            scratch_dir: h._scratch.path().to_path_buf(),
            ..ExecutorConfig::default()
        },
        h.name_set.clone(),
        h.provider.clone(),
        Arc::new(SlowHost {
            delay: Duration::from_secs(3600),
        }),
        h.sink.clone(),
    );

    let err = handler.handle(&job()).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("failed to prepare workspace"));
    // The clone never finished, so no VM was ever provisioned.
    assert!(h.provider.created.lock().unwrap().is_empty());
    assert!(h.name_set.is_empty());
}

#[tokio::test]
async fn test_secrets_never_reach_the_sink() {
    let h = harness(RecordingRuntime::default(), ExecutorConfig::default());

    let mut job = job();
    job.redacted_values
        .insert("TOKEN".into(), "spec.yaml".into());

    h.handler.handle(&job).await.unwrap();

    let lines = h.sink.lines.lock().unwrap();
    assert!(lines.iter().all(|(_, _, line)| !line.contains("spec.yaml")));
    assert!(lines.iter().any(|(_, _, line)| line.contains("***")));
}

#[tokio::test]
async fn test_pre_dequeue_always_allows_without_isolation() {
    let vm = Arc::new(RecordingRuntime::default());
    let mut provider = FakeProvider::new(vm);
    provider.running = vec!["sweep-executor-orphan".into()];
    let handler = Handler::new(
        ExecutorConfig::default(),
        Arc::new(NameSet::new()),
        Arc::new(provider),
        Arc::new(FakeHost::default()),
        Arc::new(VecSink::default()),
    );

    assert!(handler.pre_dequeue().await.unwrap());
}

#[tokio::test]
async fn test_pre_dequeue_refuses_when_orphans_saturate_handlers() {
    let vm = Arc::new(RecordingRuntime::default());
    let mut provider = FakeProvider::new(vm);
    provider.running = vec![
        "sweep-executor-orphan-a".into(),
        "sweep-executor-orphan-b".into(),
        "unrelated-vm".into(),
    ];
    let config = ExecutorConfig {
        use_firecracker: true,
        num_handlers: 2,
        ..Default::default()
    };
    let handler = Handler::new(
        config,
        Arc::new(NameSet::new()),
        Arc::new(provider),
        Arc::new(FakeHost::default()),
        Arc::new(VecSink::default()),
    );

    assert!(!handler.pre_dequeue().await.unwrap());
}

#[tokio::test]
async fn test_pre_dequeue_allows_below_handler_count() {
    let vm = Arc::new(RecordingRuntime::default());
    let mut provider = FakeProvider::new(vm);
    provider.running = vec!["sweep-executor-live".into()];
    let config = ExecutorConfig {
        use_firecracker: true,
        num_handlers: 2,
        ..Default::default()
    };
    let handler = Handler::new(
        config,
        Arc::new(NameSet::new()),
        Arc::new(provider),
        Arc::new(FakeHost::default()),
        Arc::new(VecSink::default()),
    );

    assert!(handler.pre_dequeue().await.unwrap());
}
