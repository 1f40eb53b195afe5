//! Shared test fixtures: a scriptable process launcher, gated item
//! operations, and dispatcher construction with test-friendly timing.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use medialoom_core::job::JobStatus;
use medialoom_core::types::JobId;
use medialoom_engine::config::EngineConfig;
use medialoom_engine::dispatcher::{JobDispatcher, WorkerSet};
use medialoom_engine::ops::{BlockingItemOp, ItemOperation, ItemOutcome};
use medialoom_engine::process::{ProcessHandle, ProcessLauncher, ProcessSpec};
use medialoom_engine::store::JobStore;
use medialoom_events::ProgressBus;

// ---------------------------------------------------------------------------
// Fake external processes
// ---------------------------------------------------------------------------

/// Script for a fake external process.
#[derive(Clone)]
pub struct FakeProcess {
    /// Diagnostic lines emitted one by one.
    pub lines: Vec<String>,
    /// Exit code reported after the lines run out (unless hanging).
    pub exit_code: i32,
    /// Delay before each emitted line.
    pub line_delay: Duration,
    /// Keep running after the lines run out until terminated or killed.
    pub hang: bool,
    /// Whether a graceful terminate actually ends the process.
    pub exits_on_terminate: bool,
}

impl Default for FakeProcess {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            exit_code: 0,
            line_delay: Duration::from_millis(5),
            hang: false,
            exits_on_terminate: true,
        }
    }
}

/// Observable side of a fake process, shared with the test body.
#[derive(Default)]
pub struct ProcessProbe {
    pub terminated: AtomicBool,
    pub killed: AtomicBool,
    pub exited: AtomicBool,
}

impl ProcessProbe {
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    script: FakeProcess,
    pub probe: Arc<ProcessProbe>,
}

impl FakeLauncher {
    pub fn new(script: FakeProcess) -> Self {
        Self {
            script,
            probe: Arc::new(ProcessProbe::default()),
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self, _spec: &ProcessSpec) -> io::Result<Box<dyn ProcessHandle>> {
        Ok(Box::new(FakeHandle {
            lines: self.script.lines.clone().into(),
            script: self.script.clone(),
            probe: Arc::clone(&self.probe),
        }))
    }
}

/// Launcher whose every launch fails, for exercising fatal start errors.
pub struct FailingLauncher;

#[async_trait]
impl ProcessLauncher for FailingLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ProcessHandle>> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: no such file or directory", spec.program),
        ))
    }
}

struct FakeHandle {
    lines: VecDeque<String>,
    script: FakeProcess,
    probe: Arc<ProcessProbe>,
}

impl FakeHandle {
    fn should_exit(&self) -> bool {
        self.probe.killed.load(Ordering::SeqCst)
            || (self.script.exits_on_terminate && self.probe.terminated.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.lines.pop_front() {
            tokio::time::sleep(self.script.line_delay).await;
            return Ok(Some(line));
        }
        if self.script.hang {
            while !self.should_exit() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Ok(None)
    }

    fn terminate(&mut self) {
        self.probe.terminated.store(true, Ordering::SeqCst);
    }

    async fn kill(&mut self) {
        self.probe.killed.store(true, Ordering::SeqCst);
    }

    async fn wait(&mut self) -> io::Result<i32> {
        if self.script.hang {
            while !self.should_exit() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        self.probe.exited.store(true, Ordering::SeqCst);
        if self.probe.killed.load(Ordering::SeqCst) {
            Ok(-1)
        } else {
            Ok(self.script.exit_code)
        }
    }
}

// ---------------------------------------------------------------------------
// Item operations
// ---------------------------------------------------------------------------

/// Async item operation from a plain closure.
pub struct ClosureOperation<F>(pub F);

#[async_trait]
impl<F> ItemOperation for ClosureOperation<F>
where
    F: Fn(&str) -> ItemOutcome + Send + Sync,
{
    async fn apply(&self, item: &str) -> ItemOutcome {
        (self.0)(item)
    }
}

/// Operation that blocks until the test opens the gate, then succeeds.
pub struct GatedOperation {
    gate: watch::Receiver<bool>,
}

impl GatedOperation {
    /// Returns the operation and the sender that opens the gate.
    pub fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { gate: rx }, tx)
    }
}

#[async_trait]
impl ItemOperation for GatedOperation {
    async fn apply(&self, _item: &str) -> ItemOutcome {
        let mut gate = self.gate.clone();
        if gate.wait_for(|open| *open).await.is_err() {
            return ItemOutcome::Skipped;
        }
        ItemOutcome::Succeeded
    }
}

/// Blocking unit op that fails items containing "bad".
pub fn bad_item_op() -> BlockingItemOp {
    Arc::new(|item| {
        if item.contains("bad") {
            ItemOutcome::Failed(format!("Rejected item: {item}"))
        } else {
            ItemOutcome::Succeeded
        }
    })
}

/// Async item op that fails items containing "bad".
pub fn bad_item_operation() -> Arc<dyn ItemOperation> {
    Arc::new(ClosureOperation(|item: &str| {
        if item.contains("bad") {
            ItemOutcome::Failed(format!("Rejected item: {item}"))
        } else {
            ItemOutcome::Succeeded
        }
    }))
}

// ---------------------------------------------------------------------------
// Dispatcher construction
// ---------------------------------------------------------------------------

/// Engine config with short timings suitable for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        grace_period: Duration::from_millis(300),
        publish_interval: Duration::ZERO,
        heartbeat_interval: Duration::from_millis(100),
        item_timeout: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(5),
        ..EngineConfig::default()
    }
}

pub struct TestEngine {
    pub dispatcher: Arc<JobDispatcher>,
    pub store: Arc<JobStore>,
    pub bus: Arc<ProgressBus>,
}

/// Build a dispatcher wired with the given fakes.
pub fn start_engine(
    config: EngineConfig,
    launcher: Arc<dyn ProcessLauncher>,
    thumbnail_op: BlockingItemOp,
    enrich_op: Arc<dyn ItemOperation>,
) -> TestEngine {
    let store = Arc::new(JobStore::new());
    let bus = Arc::new(ProgressBus::default());
    let dispatcher = JobDispatcher::start(
        config,
        Arc::clone(&store),
        Arc::clone(&bus),
        WorkerSet {
            launcher,
            thumbnail_op,
            enrich_op,
        },
    );
    TestEngine {
        dispatcher,
        store,
        bus,
    }
}

/// Poll the store until the job reaches `status` or the timeout expires.
pub async fn wait_for_status(
    store: &JobStore,
    job_id: JobId,
    status: JobStatus,
    timeout: Duration,
) -> medialoom_core::job::Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(job) = store.get(job_id).await {
            if job.status == status {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out waiting for job {job_id} to reach {status}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
