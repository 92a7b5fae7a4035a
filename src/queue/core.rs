// src/queue/core.rs

//! Pure queue state machine.
//!
//! [`QueueCore`] consumes [`QueueEvent`]s and returns a [`QueueStep`]: the
//! commands the async shell (`queue::runtime::QueueRuntime`) should carry
//! out. It has no channels, no Tokio types and performs no IO, so every
//! scheduling rule can be unit tested with plain method calls.

use std::collections::{BTreeMap, VecDeque};

use super::step::{JobNotice, QueueCommand, QueueStep};
use super::{Job, JobId, JobOutcome, JobReport, JobState, QueueEvent, QueueOptions, QueueReport};

#[derive(Debug)]
struct JobRecord {
    job: Job,
    state: JobState,
    cancel_requested: bool,
}

/// Pending FIFO, running count and per-job states of one queue.
#[derive(Debug)]
pub struct QueueCore {
    options: QueueOptions,
    pending: VecDeque<JobId>,
    records: BTreeMap<JobId, JobRecord>,
    running: usize,
    peak_running: usize,
    cycle: u64,
    active: bool,
    stopped: bool,
}

impl QueueCore {
    pub fn new(mut options: QueueOptions) -> Self {
        options.limit = options.limit.max(1);
        Self {
            options,
            pending: VecDeque::new(),
            records: BTreeMap::new(),
            running: 0,
            peak_running: 0,
            cycle: 0,
            active: false,
            stopped: false,
        }
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn limit(&self) -> usize {
        self.options.limit
    }

    pub fn running(&self) -> usize {
        self.running
    }

    /// Highest running count observed so far.
    pub fn peak_running(&self) -> usize {
        self.peak_running
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True between `start()` and the matching "finished" announcement.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.records.get(&id).map(|r| r.state)
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.records.get(&id).map(|r| &r.job)
    }

    pub fn report(&self) -> QueueReport {
        QueueReport {
            queue: self.options.name.clone(),
            cycle: self.cycle,
            stopped: self.stopped,
            jobs: self
                .records
                .iter()
                .map(|(id, r)| JobReport {
                    id: *id,
                    label: r.job.label.clone(),
                    command_line: r.job.command_line(),
                    state: r.state,
                })
                .collect(),
        }
    }

    /// Handle a single event, returning the commands for the IO shell.
    ///
    /// `Subscribe` and `JobOutput` carry nothing the core tracks and produce
    /// an empty step.
    pub fn step(&mut self, event: QueueEvent) -> QueueStep {
        let commands = match event {
            QueueEvent::Append { id, job } => self.append(id, job),
            QueueEvent::Start => self.start(),
            QueueEvent::Stop => self.stop(),
            QueueEvent::Cancel(id) => self.cancel(id),
            QueueEvent::CancelRunning => self.cancel_running(),
            QueueEvent::JobCompleted { id, outcome } => self.complete(id, outcome),
            QueueEvent::Subscribe(_) | QueueEvent::JobOutput { .. } => Vec::new(),
            QueueEvent::Shutdown => {
                return QueueStep {
                    commands: Vec::new(),
                    keep_running: false,
                };
            }
        };

        let finished = commands
            .iter()
            .any(|c| matches!(c, QueueCommand::Finished(_)));
        QueueStep {
            commands,
            keep_running: !(finished && self.options.exit_when_finished),
        }
    }

    fn append(&mut self, id: JobId, job: Job) -> Vec<QueueCommand> {
        if self.stopped || self.records.contains_key(&id) {
            return Vec::new();
        }

        self.records.insert(
            id,
            JobRecord {
                job,
                state: JobState::Idle,
                cancel_requested: false,
            },
        );
        self.pending.push_back(id);

        let mut commands = Vec::new();
        if self.active {
            self.promote(&mut commands);
        }
        commands
    }

    fn start(&mut self) -> Vec<QueueCommand> {
        if self.active {
            return Vec::new();
        }

        self.cycle += 1;
        let mut commands = Vec::new();

        if self.pending.is_empty() {
            commands.push(QueueCommand::Finished(self.report()));
            return commands;
        }

        self.active = true;
        self.promote(&mut commands);
        commands
    }

    fn stop(&mut self) -> Vec<QueueCommand> {
        self.stopped = true;

        let mut commands = Vec::new();
        while let Some(id) = self.pending.pop_front() {
            self.mark_canceled(id, &mut commands);
        }
        self.maybe_finish(&mut commands);
        commands
    }

    fn cancel(&mut self, id: JobId) -> Vec<QueueCommand> {
        let mut commands = Vec::new();

        match self.state_of(id) {
            Some(JobState::Idle) => {
                self.pending.retain(|p| *p != id);
                self.mark_canceled(id, &mut commands);
                self.maybe_finish(&mut commands);
            }
            Some(JobState::Running) => {
                if let Some(record) = self.records.get_mut(&id)
                    && !record.cancel_requested
                {
                    record.cancel_requested = true;
                    commands.push(QueueCommand::Cancel(id));
                }
            }
            _ => {}
        }

        commands
    }

    fn cancel_running(&mut self) -> Vec<QueueCommand> {
        self.records
            .iter_mut()
            .filter(|(_, r)| r.state == JobState::Running && !r.cancel_requested)
            .map(|(id, r)| {
                r.cancel_requested = true;
                QueueCommand::Cancel(*id)
            })
            .collect()
    }

    fn complete(&mut self, id: JobId, outcome: JobOutcome) -> Vec<QueueCommand> {
        let mut commands = Vec::new();

        let Some(record) = self.records.get_mut(&id) else {
            return commands;
        };
        if record.state != JobState::Running {
            return commands;
        }

        // A process that died from our own kill is a cancellation, not a crash.
        let outcome = match outcome {
            JobOutcome::Crashed if record.cancel_requested => JobOutcome::Canceled,
            other => other,
        };
        record.state = outcome.terminal_state();
        self.running -= 1;

        let label = record.job.label.clone();
        commands.push(QueueCommand::Notify(match record.state {
            JobState::Canceled => JobNotice::Canceled { id, label },
            state => JobNotice::Finished {
                id,
                label,
                exit_code: state.exit_code(),
            },
        }));

        if !self.stopped {
            self.promote(&mut commands);
        }
        self.maybe_finish(&mut commands);
        commands
    }

    /// Launch pending jobs in FIFO order while under the limit.
    fn promote(&mut self, commands: &mut Vec<QueueCommand>) {
        while self.active && self.running < self.options.limit {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };

            record.state = JobState::Running;
            self.running += 1;
            self.peak_running = self.peak_running.max(self.running);

            commands.push(QueueCommand::Notify(JobNotice::Started {
                id,
                label: record.job.label.clone(),
            }));
            commands.push(QueueCommand::Launch {
                id,
                job: record.job.clone(),
            });
        }
    }

    fn mark_canceled(&mut self, id: JobId, commands: &mut Vec<QueueCommand>) {
        if let Some(record) = self.records.get_mut(&id) {
            record.state = JobState::Canceled;
            commands.push(QueueCommand::Notify(JobNotice::Canceled {
                id,
                label: record.job.label.clone(),
            }));
        }
    }

    fn maybe_finish(&mut self, commands: &mut Vec<QueueCommand>) {
        if self.active && self.pending.is_empty() && self.running == 0 {
            self.active = false;
            commands.push(QueueCommand::Finished(self.report()));
        }
    }
}
