use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use autoconvert::exec::backend::BackendFuture;
use autoconvert::exec::{ExecutorBackend, LaunchRequest};
use autoconvert::queue::{JobId, JobOutcome, OutputStream, QueueEvent};

/// What a fake job does once launched.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    /// Exit with this code after the duration.
    Exit(i32),
    /// Report a launch failure immediately.
    FailLaunch,
    /// Print this line on stdout, then exit 0 after the duration.
    Print(String),
    /// Run until canceled.
    Hang,
}

/// Entry in the shared execution log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Launched(String),
    Completed(String),
    CancelRequested(String),
}

/// Execution log shared between fake executors (one per queue).
#[derive(Debug, Clone, Default)]
pub struct ExecLog {
    events: Arc<Mutex<Vec<ExecEvent>>>,
}

impl ExecLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ExecEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<ExecEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Labels in launch order.
    pub fn launched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ExecEvent::Launched(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    /// Highest number of jobs whose label starts with `prefix` that were
    /// launched but not yet completed at the same time.
    pub fn max_concurrent(&self, prefix: &str) -> usize {
        let mut running = 0usize;
        let mut peak = 0usize;
        for event in self.events() {
            match event {
                ExecEvent::Launched(l) if l.starts_with(prefix) => {
                    running += 1;
                    peak = peak.max(running);
                }
                ExecEvent::Completed(l) if l.starts_with(prefix) => running -= 1,
                _ => {}
            }
        }
        peak
    }
}

/// Per-label script for the fake executor.
#[derive(Debug, Clone)]
pub struct FakeScript {
    default_duration: Duration,
    overrides: HashMap<String, (Duration, FakeBehaviour)>,
}

impl FakeScript {
    /// Every job exits 0 after `duration`.
    pub fn uniform(duration: Duration) -> Self {
        Self {
            default_duration: duration,
            overrides: HashMap::new(),
        }
    }

    pub fn with(mut self, label: &str, duration: Duration, behaviour: FakeBehaviour) -> Self {
        self.overrides.insert(label.to_string(), (duration, behaviour));
        self
    }

    fn lookup(&self, label: &str) -> (Duration, FakeBehaviour) {
        self.overrides
            .get(label)
            .cloned()
            .unwrap_or((self.default_duration, FakeBehaviour::Exit(0)))
    }
}

/// A fake executor that:
/// - records launches, completions and cancel requests in an `ExecLog`
/// - completes each job after its scripted duration with its scripted outcome
/// - reports `Canceled` for jobs canceled before they finish.
pub struct FakeExecutor {
    queue_tx: mpsc::Sender<QueueEvent>,
    log: ExecLog,
    script: FakeScript,
    cancels: HashMap<JobId, (String, oneshot::Sender<()>)>,
}

impl FakeExecutor {
    pub fn new(queue_tx: mpsc::Sender<QueueEvent>, log: ExecLog, script: FakeScript) -> Self {
        Self {
            queue_tx,
            log,
            script,
            cancels: HashMap::new(),
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn launch(&mut self, request: LaunchRequest) -> BackendFuture<'_> {
        let LaunchRequest { id, job } = request;
        let label = job.label.clone();
        let (duration, behaviour) = self.script.lookup(&label);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.log.push(ExecEvent::Launched(label.clone()));
        self.cancels.insert(id, (label.clone(), cancel_tx));

        let tx = self.queue_tx.clone();
        let log = self.log.clone();

        tokio::spawn(async move {
            let outcome = match behaviour {
                FakeBehaviour::FailLaunch => JobOutcome::LaunchFailed("no such program".into()),
                behaviour => {
                    if let FakeBehaviour::Print(line) = &behaviour {
                        let _ = tx
                            .send(QueueEvent::JobOutput {
                                id,
                                stream: OutputStream::Stdout,
                                chunk: format!("{line}\n").into_bytes(),
                            })
                            .await;
                    }
                    let wait = async {
                        match behaviour {
                            FakeBehaviour::Hang => std::future::pending::<()>().await,
                            _ => tokio::time::sleep(duration).await,
                        }
                    };
                    tokio::select! {
                        _ = wait => match behaviour {
                            FakeBehaviour::Exit(code) => JobOutcome::Exited(code),
                            _ => JobOutcome::Exited(0),
                        },
                        Ok(()) = cancel_rx => JobOutcome::Canceled,
                    }
                }
            };

            log.push(ExecEvent::Completed(label));
            let _ = tx.send(QueueEvent::JobCompleted { id, outcome }).await;
        });

        Box::pin(async { Ok(()) })
    }

    fn cancel(&mut self, id: JobId) -> BackendFuture<'_> {
        if let Some((label, cancel)) = self.cancels.remove(&id) {
            self.log.push(ExecEvent::CancelRequested(label));
            let _ = cancel.send(());
        }
        Box::pin(async { Ok(()) })
    }
}
