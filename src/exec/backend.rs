// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The queue runtime talks to an `ExecutorBackend` instead of a raw mpsc
//! sender. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor in [`executor_loop`](super::executor_loop).
//!
//! - `RealExecutorBackend` wraps the `spawn_executor` loop and forwards
//!   launch and cancel requests over an mpsc channel.
//! - Tests provide their own `ExecutorBackend` that, for example, records
//!   which jobs were launched and emits `JobCompleted` events on a schedule.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::errors::{AutoconvertError, Result};
use crate::queue::{DEFAULT_GRACE_PERIOD, JobId, QueueEvent};

use super::executor_loop::spawn_executor;
use super::{ExecutorCommand, LaunchRequest};

/// Boxed future returned by backend methods.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how promoted jobs are executed.
///
/// Every launched job must eventually produce exactly one
/// `QueueEvent::JobCompleted` on the queue's channel, including jobs that
/// fail to launch and jobs that are canceled.
pub trait ExecutorBackend: Send {
    /// Start the given job.
    fn launch(&mut self, request: LaunchRequest) -> BackendFuture<'_>;

    /// Request cancellation of a running job.
    ///
    /// Unknown or already finished jobs are ignored.
    fn cancel(&mut self, id: JobId) -> BackendFuture<'_>;
}

/// Real executor backend used in production.
///
/// The queue runtime calls `launch`/`cancel`, which forward the request to
/// the background executor spawned by [`spawn_executor`].
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl RealExecutorBackend {
    /// Create a new backend reporting to `queue_tx`, using the default
    /// 5 second terminate-to-kill grace period.
    ///
    /// This spawns the background executor loop immediately, so it must be
    /// called inside a Tokio runtime.
    pub fn new(queue_tx: mpsc::Sender<QueueEvent>) -> Self {
        Self::with_grace_period(queue_tx, DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(queue_tx: mpsc::Sender<QueueEvent>, grace: Duration) -> Self {
        let tx = spawn_executor(queue_tx, grace);
        Self { tx }
    }

    fn forward(&self, command: ExecutorCommand) -> BackendFuture<'static> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(command)
                .await
                .map_err(|_| AutoconvertError::QueueClosed("executor".to_string()))
        })
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn launch(&mut self, request: LaunchRequest) -> BackendFuture<'_> {
        self.forward(ExecutorCommand::Launch(request))
    }

    fn cancel(&mut self, id: JobId) -> BackendFuture<'_> {
        self.forward(ExecutorCommand::Cancel(id))
    }
}
