pub mod builders;
pub mod fake_executor;

use std::sync::{Arc, Mutex, Once};

use autoconvert::queue::{QueueHandle, QueueOptions, QueueReport, spawn_queue};
use autoconvert::status::{JobContext, JobEvent, JobEventKind, JobObserver};
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

use crate::fake_executor::{ExecLog, FakeExecutor, FakeScript};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Observer that keeps every callback, output chunks included.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(label, kind)` pairs without output chunks.
    pub fn transitions(&self) -> Vec<(String, JobEventKind)> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e.kind, JobEventKind::Output(..)))
            .map(|e| (e.label, e.kind))
            .collect()
    }

    fn push(&self, job: &JobContext<'_>, kind: JobEventKind) {
        self.events.lock().unwrap().push(JobEvent {
            queue: job.queue.to_string(),
            id: job.id,
            label: job.label().to_string(),
            kind,
        });
    }
}

impl JobObserver for RecordingObserver {
    fn on_started(&self, job: &JobContext<'_>) {
        self.push(job, JobEventKind::Started);
    }

    fn on_finished(&self, job: &JobContext<'_>, exit_code: Option<i32>) {
        self.push(job, JobEventKind::Finished(exit_code));
    }

    fn on_canceled(&self, job: &JobContext<'_>) {
        self.push(job, JobEventKind::Canceled);
    }

    fn on_output(&self, job: &JobContext<'_>, stream: autoconvert::queue::OutputStream, chunk: &[u8]) {
        self.push(job, JobEventKind::Output(stream, chunk.to_vec()));
    }
}

/// Spawn a queue backed by a `FakeExecutor`.
pub fn spawn_fake_queue(
    options: QueueOptions,
    log: &ExecLog,
    script: FakeScript,
    observer: Option<Arc<RecordingObserver>>,
) -> (QueueHandle, JoinHandle<autoconvert::errors::Result<QueueReport>>) {
    let observers: Vec<Arc<dyn JobObserver>> = observer
        .into_iter()
        .map(|o| o as Arc<dyn JobObserver>)
        .collect();
    let log = log.clone();
    spawn_queue(options, &observers, move |tx| FakeExecutor::new(tx, log, script))
}
