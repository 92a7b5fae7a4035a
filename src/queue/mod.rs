// src/queue/mod.rs

//! Bounded process queue.
//!
//! A queue holds a FIFO of pending jobs and a concurrency limit. Once
//! started it promotes pending jobs while fewer than `limit` are running,
//! promotes exactly one more every time a running job reaches a terminal
//! state, and announces "finished" once nothing is pending or running.
//!
//! The pure state machine lives in [`core`]; the async control loop that
//! talks to the executor and to observers is in [`runtime`]; [`handle`] is the
//! cloneable front door callers use to append, start, stop and cancel.
//!
//! Every mutation of a queue goes through one channel and is applied by one
//! control loop, so API calls and process-exit notifications never race.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::types::Verbosity;

pub mod core;
pub mod handle;
pub mod job;
pub mod runtime;
pub mod step;

pub use self::core::QueueCore;
pub use handle::QueueHandle;
pub use job::{Job, JobId, JobOutcome, JobReport, JobState};
pub use runtime::{QueueRuntime, spawn_queue};
pub use step::{JobNotice, QueueCommand, QueueStep};

/// Default number of simultaneously running processes per queue.
pub const DEFAULT_MAX_PROCESSES: usize = 2;

/// Delay between the terminate request and the forced kill on cancellation.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);

/// Which output pipe a chunk of bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Options fixed for the lifetime of one queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Name used in logs and reports (e.g. the phase name).
    pub name: String,
    /// Maximum number of jobs running at once; clamped to at least 1.
    pub limit: usize,
    pub verbosity: Verbosity,
    /// If true, the control loop exits right after announcing "finished".
    pub exit_when_finished: bool,
}

impl QueueOptions {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
            verbosity: Verbosity::default(),
            exit_when_finished: false,
        }
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn exit_when_finished(mut self, exit: bool) -> Self {
        self.exit_when_finished = exit;
        self
    }
}

/// Snapshot of a queue when it announces "finished" (and when its control
/// loop exits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueReport {
    pub queue: String,
    /// Start cycle this report closes (1 for the first `start()`).
    pub cycle: u64,
    /// Whether `stop()` was called on this queue.
    pub stopped: bool,
    /// Every job ever appended, in append order.
    pub jobs: Vec<JobReport>,
}

impl QueueReport {
    pub fn count(&self, pred: impl Fn(&JobState) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.state)).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.state, JobState::FinishedError { .. }))
    }

    /// True if every job exited with code 0.
    pub fn all_ok(&self) -> bool {
        self.jobs.iter().all(|j| j.state == JobState::FinishedOk)
    }
}

/// Messages flowing into a queue's control loop.
#[derive(Debug)]
pub enum QueueEvent {
    /// Add a job to the tail of the pending list.
    Append { id: JobId, job: Job },
    Start,
    /// Drop every pending job. Running jobs keep running.
    Stop,
    /// Cancel one job: dropped if pending, terminated if running.
    Cancel(JobId),
    /// Cancel every running job.
    CancelRunning,
    /// Register a listener for "finished" announcements.
    Subscribe(mpsc::UnboundedSender<QueueReport>),
    /// A launched job ended.
    JobCompleted { id: JobId, outcome: JobOutcome },
    /// Bytes read from a running job's stdout or stderr.
    JobOutput {
        id: JobId,
        stream: OutputStream,
        chunk: Vec<u8>,
    },
    /// Exit the control loop (running processes are left to the executor).
    Shutdown,
}
