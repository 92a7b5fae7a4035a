// src/queue/job.rs

//! Job description and per-job lifecycle state.

use std::fmt;
use std::path::PathBuf;

/// Identifier of a job within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One external process invocation.
///
/// Placeholders are already resolved: `program` and `args` go to the OS
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; `None` inherits the caller's.
    pub working_dir: Option<PathBuf>,
    /// Human-readable name used in status output.
    pub label: String,
}

impl Job {
    /// New job with no arguments, labelled with the program name.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            label: program.clone(),
            program,
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Space-joined command line, for logs and dry-run output only.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lifecycle of a job inside a queue.
///
/// `Idle -> Running -> {FinishedOk | FinishedError | Canceled}`, plus
/// `Idle -> Canceled` for jobs dropped before they ever ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    /// The process exited with code 0.
    ///
    /// This only says the process terminated cleanly. Whether the external
    /// tool actually converted anything is not known here.
    FinishedOk,
    /// Non-zero exit (`Some(code)`), or no exit code at all because the
    /// process could not be launched or was killed by a signal.
    FinishedError { exit_code: Option<i32> },
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::FinishedOk | JobState::FinishedError { .. } | JobState::Canceled
        )
    }

    /// Exit code as reported to observers; `Some(0)` for `FinishedOk`.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobState::FinishedOk => Some(0),
            JobState::FinishedError { exit_code } => *exit_code,
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Running => write!(f, "running"),
            JobState::FinishedOk => write!(f, "done"),
            JobState::FinishedError {
                exit_code: Some(code),
            } => write!(f, "error (exit code {code})"),
            JobState::FinishedError { exit_code: None } => write!(f, "error (no exit code)"),
            JobState::Canceled => write!(f, "canceled"),
        }
    }
}

/// What the executor observed when a launched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The process exited on its own with this code.
    Exited(i32),
    /// The process could not be started (missing binary, permissions, ...).
    LaunchFailed(String),
    /// The process ended without an exit code (signal, lost wait status).
    Crashed,
    /// The process was stopped because cancellation was requested.
    Canceled,
}

impl JobOutcome {
    /// Terminal state this outcome maps to.
    pub fn terminal_state(&self) -> JobState {
        match self {
            JobOutcome::Exited(0) => JobState::FinishedOk,
            JobOutcome::Exited(code) => JobState::FinishedError {
                exit_code: Some(*code),
            },
            JobOutcome::LaunchFailed(_) | JobOutcome::Crashed => {
                JobState::FinishedError { exit_code: None }
            }
            JobOutcome::Canceled => JobState::Canceled,
        }
    }
}

/// Final, read-only view of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: JobId,
    pub label: String,
    pub command_line: String,
    pub state: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_terminal_states() {
        assert_eq!(JobOutcome::Exited(0).terminal_state(), JobState::FinishedOk);
        assert_eq!(
            JobOutcome::Exited(3).terminal_state(),
            JobState::FinishedError { exit_code: Some(3) }
        );
        assert_eq!(
            JobOutcome::LaunchFailed("no such file".into()).terminal_state(),
            JobState::FinishedError { exit_code: None }
        );
        assert_eq!(JobOutcome::Canceled.terminal_state(), JobState::Canceled);
        assert!(JobOutcome::Crashed.terminal_state().is_terminal());
    }
}
