// src/status/mod.rs

//! Job status observers.
//!
//! A queue reports every job transition (`started`, `finished(exit code)`,
//! `canceled`) and every chunk of process output to the [`JobObserver`]s it
//! was created with. Rendering is entirely up to the observer.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::queue::{Job, JobId, OutputStream};
use crate::types::Verbosity;

/// Which job an observer callback is about.
#[derive(Debug, Clone, Copy)]
pub struct JobContext<'a> {
    pub queue: &'a str,
    pub id: JobId,
    pub job: &'a Job,
}

impl JobContext<'_> {
    pub fn label(&self) -> &str {
        &self.job.label
    }
}

/// Receives job transitions from a queue.
///
/// Callbacks run on the queue's control loop and must not block.
pub trait JobObserver: Send + Sync {
    fn on_started(&self, _job: &JobContext<'_>) {}

    /// The process ended on its own. `exit_code` is `None` when it could not
    /// be launched or died without a code. `Some(0)` only means the process
    /// exited cleanly, not that the conversion produced anything.
    fn on_finished(&self, _job: &JobContext<'_>, _exit_code: Option<i32>) {}

    fn on_canceled(&self, _job: &JobContext<'_>) {}

    fn on_output(&self, _job: &JobContext<'_>, _stream: OutputStream, _chunk: &[u8]) {}
}

/// Renders job transitions as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver {
    verbosity: Verbosity,
}

impl LogObserver {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl JobObserver for LogObserver {
    fn on_started(&self, job: &JobContext<'_>) {
        if self.verbosity.announces() {
            info!(queue = job.queue, job = %job.id, label = job.label(), "running");
        } else {
            debug!(queue = job.queue, job = %job.id, label = job.label(), "running");
        }
    }

    fn on_finished(&self, job: &JobContext<'_>, exit_code: Option<i32>) {
        match exit_code {
            Some(0) if self.verbosity.announces() => {
                info!(queue = job.queue, job = %job.id, label = job.label(), "done");
            }
            Some(0) => {
                debug!(queue = job.queue, job = %job.id, label = job.label(), "done");
            }
            Some(code) => {
                warn!(queue = job.queue, job = %job.id, label = job.label(), exit_code = code, "failed");
            }
            None => {
                warn!(queue = job.queue, job = %job.id, label = job.label(), "failed (no exit code)");
            }
        }
    }

    fn on_canceled(&self, job: &JobContext<'_>) {
        warn!(queue = job.queue, job = %job.id, label = job.label(), "canceled");
    }

    fn on_output(&self, job: &JobContext<'_>, stream: OutputStream, chunk: &[u8]) {
        if self.verbosity.is_debug() {
            info!(job = %job.id, ?stream, bytes = chunk.len(), "output");
        }
    }
}

/// Owned copy of one observer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub queue: String,
    pub id: JobId,
    pub label: String,
    pub kind: JobEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEventKind {
    Started,
    Finished(Option<i32>),
    Canceled,
    Output(OutputStream, Vec<u8>),
}

/// Forwards every callback as a [`JobEvent`] over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, job: &JobContext<'_>, kind: JobEventKind) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(JobEvent {
            queue: job.queue.to_string(),
            id: job.id,
            label: job.label().to_string(),
            kind,
        });
    }
}

impl JobObserver for ChannelObserver {
    fn on_started(&self, job: &JobContext<'_>) {
        self.send(job, JobEventKind::Started);
    }

    fn on_finished(&self, job: &JobContext<'_>, exit_code: Option<i32>) {
        self.send(job, JobEventKind::Finished(exit_code));
    }

    fn on_canceled(&self, job: &JobContext<'_>) {
        self.send(job, JobEventKind::Canceled);
    }

    fn on_output(&self, job: &JobContext<'_>, stream: OutputStream, chunk: &[u8]) {
        self.send(job, JobEventKind::Output(stream, chunk.to_vec()));
    }
}

/// Per-job transcript: where it ran, what ran, and everything it printed.
///
/// stdout is appended as-is, stderr chunks are prefixed with `error: `.
#[derive(Debug, Default)]
pub struct DetailLog {
    logs: Mutex<HashMap<(String, JobId), String>>,
}

impl DetailLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript of one job, if it ever started.
    pub fn get(&self, queue: &str, id: JobId) -> Option<String> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(queue.to_string(), id))
            .cloned()
    }

    fn append(&self, job: &JobContext<'_>, text: &str) {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry((job.queue.to_string(), job.id))
            .or_default()
            .push_str(text);
    }
}

impl JobObserver for DetailLog {
    fn on_started(&self, job: &JobContext<'_>) {
        let mut header = String::new();
        if let Some(dir) = &job.job.working_dir {
            header.push_str(&format!("cd {}\n", dir.display()));
        }
        header.push_str(&job.job.command_line());
        header.push('\n');
        self.append(job, &header);
    }

    fn on_output(&self, job: &JobContext<'_>, stream: OutputStream, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        match stream {
            OutputStream::Stdout => self.append(job, &text),
            OutputStream::Stderr => self.append(job, &format!("error: {text}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_log_records_header_and_output() {
        let log = DetailLog::new();
        let job = Job::new("gwyexport")
            .args(["-f", "png"])
            .in_dir("/data/run1");
        let ctx = JobContext {
            queue: "image",
            id: JobId(1),
            job: &job,
        };

        log.on_started(&ctx);
        log.on_output(&ctx, OutputStream::Stdout, b"converted 3 files\n");
        log.on_output(&ctx, OutputStream::Stderr, b"bad \xff header\n");

        let text = log.get("image", JobId(1)).unwrap();
        assert_eq!(
            text,
            "cd /data/run1\ngwyexport -f png\nconverted 3 files\nerror: bad \u{fffd} header\n"
        );
        assert!(log.get("flatten", JobId(1)).is_none());
    }

    #[test]
    fn channel_observer_forwards_transitions() {
        let (observer, mut rx) = ChannelObserver::channel();
        let job = Job::new("tool").label("flatten: a");
        let ctx = JobContext {
            queue: "flatten",
            id: JobId(4),
            job: &job,
        };

        observer.on_started(&ctx);
        observer.on_finished(&ctx, Some(2));

        assert_eq!(rx.try_recv().unwrap().kind, JobEventKind::Started);
        let finished = rx.try_recv().unwrap();
        assert_eq!(finished.label, "flatten: a");
        assert_eq!(finished.kind, JobEventKind::Finished(Some(2)));
    }
}
