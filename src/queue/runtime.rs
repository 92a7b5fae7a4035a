// src/queue/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::{ExecutorBackend, LaunchRequest};
use crate::status::{JobContext, JobObserver};

use super::core::QueueCore;
use super::handle::QueueHandle;
use super::step::JobNotice;
use super::{JobId, JobState, OutputStream, QueueCommand, QueueEvent, QueueOptions, QueueReport};

/// Drives one [`QueueCore`] in response to `QueueEvent`s and delegates
/// process execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around the core, which contains all the queue
/// semantics. It reads events from the channel, launches and cancels jobs
/// through the executor, notifies observers and subscribers.
pub struct QueueRuntime<E: ExecutorBackend> {
    core: QueueCore,
    event_rx: mpsc::Receiver<QueueEvent>,
    executor: E,
    observers: Vec<Arc<dyn JobObserver>>,
    subscribers: Vec<mpsc::UnboundedSender<QueueReport>>,
}

impl<E: ExecutorBackend> fmt::Debug for QueueRuntime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueRuntime")
            .field("core", &self.core)
            .field("observers", &self.observers.len())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> QueueRuntime<E> {
    pub fn new(core: QueueCore, event_rx: mpsc::Receiver<QueueEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            observers: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Main event loop.
    ///
    /// Runs until a `Shutdown` event arrives, the channel closes, or (with
    /// `exit_when_finished`) the queue announces "finished". Returns the final
    /// state of every job.
    pub async fn run(mut self) -> Result<QueueReport> {
        let name = self.core.options().name.clone();
        debug!(queue = %name, limit = self.core.limit(), "queue runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    debug!(queue = %name, "queue event channel closed; exiting");
                    break;
                }
            };

            match &event {
                QueueEvent::Subscribe(tx) => self.subscribers.push(tx.clone()),
                QueueEvent::JobOutput { id, stream, chunk } => {
                    self.notify_output(*id, *stream, chunk);
                }
                other => debug!(queue = %name, event = ?other, "queue received event"),
            }

            // Feed the event into the pure core and get commands back.
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                debug!(queue = %name, "queue runtime stopping");
                break;
            }
        }

        Ok(self.core.report())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: QueueCommand) -> Result<()> {
        match command {
            QueueCommand::Launch { id, job } => {
                self.executor.launch(LaunchRequest { id, job }).await?;
            }
            QueueCommand::Cancel(id) => {
                self.executor.cancel(id).await?;
            }
            QueueCommand::Notify(notice) => self.notify(notice),
            QueueCommand::Finished(report) => self.announce_finished(report),
        }
        Ok(())
    }

    fn notify(&self, notice: JobNotice) {
        let id = match &notice {
            JobNotice::Started { id, .. }
            | JobNotice::Finished { id, .. }
            | JobNotice::Canceled { id, .. } => *id,
        };
        let Some(job) = self.core.job(id) else {
            return;
        };
        let ctx = JobContext {
            queue: &self.core.options().name,
            id,
            job,
        };

        for observer in &self.observers {
            match &notice {
                JobNotice::Started { .. } => observer.on_started(&ctx),
                JobNotice::Finished { exit_code, .. } => observer.on_finished(&ctx, *exit_code),
                JobNotice::Canceled { .. } => observer.on_canceled(&ctx),
            }
        }
    }

    fn notify_output(&self, id: JobId, stream: OutputStream, chunk: &[u8]) {
        let Some(job) = self.core.job(id) else {
            return;
        };
        let ctx = JobContext {
            queue: &self.core.options().name,
            id,
            job,
        };
        for observer in &self.observers {
            observer.on_output(&ctx, stream, chunk);
        }
    }

    fn announce_finished(&mut self, report: QueueReport) {
        let failed = report.failed().count();
        let canceled = report.count(|s| *s == JobState::Canceled);

        if self.core.options().verbosity.announces() {
            info!(
                queue = %report.queue,
                cycle = report.cycle,
                jobs = report.jobs.len(),
                failed,
                canceled,
                "queue finished"
            );
        } else {
            debug!(queue = %report.queue, cycle = report.cycle, "queue finished");
        }

        self.subscribers.retain(|tx| tx.send(report.clone()).is_ok());
    }
}

/// Spawn a queue control loop on the current Tokio runtime.
///
/// `make_executor` receives the queue's event sender so the backend can
/// report completions back to it.
pub fn spawn_queue<E, F>(
    options: QueueOptions,
    observers: &[Arc<dyn JobObserver>],
    make_executor: F,
) -> (QueueHandle, JoinHandle<Result<QueueReport>>)
where
    E: ExecutorBackend + 'static,
    F: FnOnce(mpsc::Sender<QueueEvent>) -> E,
{
    let (handle, event_rx) = QueueHandle::channel(options.name.clone());
    let executor = make_executor(handle.sender());

    let runtime = observers.iter().cloned().fold(
        QueueRuntime::new(QueueCore::new(options), event_rx, executor),
        QueueRuntime::with_observer,
    );

    (handle, tokio::spawn(runtime.run()))
}
