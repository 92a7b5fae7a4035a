// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running queued jobs, using
//! `tokio::process::Command`, and reporting back to the owning queue via
//! `QueueEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` the queue runtime uses in production, and which
//!   tests replace with a fake implementation.
//! - [`executor_loop`] owns the background loop that tracks running
//!   processes and routes cancellation requests to them.
//! - [`job_runner`] runs one process: output capture, exit status and the
//!   terminate-then-kill escalation on cancellation.

use crate::queue::{Job, JobId};

pub mod backend;
pub mod executor_loop;
pub mod job_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;

/// A job the queue has promoted to `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub id: JobId,
    pub job: Job,
}

/// Instructions accepted by the background executor loop.
#[derive(Debug, Clone)]
pub enum ExecutorCommand {
    Launch(LaunchRequest),
    /// Terminate the process of this job, escalating to a kill after the
    /// grace period.
    Cancel(JobId),
}
