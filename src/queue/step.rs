// src/queue/step.rs

//! Commands produced by the pure queue core.

use super::{Job, JobId, QueueReport};

/// Per-job transition to announce to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobNotice {
    Started {
        id: JobId,
        label: String,
    },
    /// Process ended on its own; `exit_code` is `None` if it never launched
    /// or died without a code.
    Finished {
        id: JobId,
        label: String,
        exit_code: Option<i32>,
    },
    Canceled {
        id: JobId,
        label: String,
    },
}

/// Command produced by the core, to be executed by the queue runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCommand {
    /// Hand this job to the executor.
    Launch { id: JobId, job: Job },
    /// Ask the executor to terminate this running job.
    Cancel(JobId),
    /// Forward a job transition to observers.
    Notify(JobNotice),
    /// Announce "finished" to subscribers.
    Finished(QueueReport),
}

/// Decision returned by the core after handling a single `QueueEvent`.
#[derive(Debug, Clone, Default)]
pub struct QueueStep {
    pub commands: Vec<QueueCommand>,
    /// Whether the control loop should keep running.
    pub keep_running: bool,
}

impl QueueStep {
    pub(crate) fn running(commands: Vec<QueueCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    /// Ids of jobs this step launches, in launch order.
    pub fn launched(&self) -> Vec<JobId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                QueueCommand::Launch { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Option<&QueueReport> {
        self.commands.iter().find_map(|c| match c {
            QueueCommand::Finished(report) => Some(report),
            _ => None,
        })
    }
}
