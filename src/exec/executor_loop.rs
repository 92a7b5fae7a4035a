// src/exec/executor_loop.rs

//! Main executor loop that manages running job processes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::exec::job_runner::run_job;
use crate::queue::{JobId, QueueEvent};

use super::{ExecutorCommand, LaunchRequest};

/// Internal handle for a currently-running job process.
///
/// - `cancel` fires the terminate/kill escalation inside the runner.
/// - `handle` is the Tokio task that is actually running the command.
struct ActiveJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` forwards to. Each
/// launched job runs in its own Tokio task and reports its end with a
/// `QueueEvent::JobCompleted` on `queue_tx`. The loop itself never limits
/// concurrency; that is the queue's job.
pub fn spawn_executor(
    queue_tx: mpsc::Sender<QueueEvent>,
    grace: Duration,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(32);

    tokio::spawn(async move {
        debug!("executor loop started");

        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, job| !job.handle.is_finished());

            match command {
                ExecutorCommand::Launch(request) => {
                    launch(request, &mut active, &queue_tx, grace);
                }
                ExecutorCommand::Cancel(id) => cancel(id, &mut active),
            }
        }

        debug!("executor loop finished (channel closed)");
    });

    tx
}

fn launch(
    request: LaunchRequest,
    active: &mut HashMap<JobId, ActiveJob>,
    queue_tx: &mpsc::Sender<QueueEvent>,
    grace: Duration,
) {
    let id = request.id;
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let tx = queue_tx.clone();

    let handle = tokio::spawn(async move {
        run_job(request, tx, cancel_rx, grace).await;
        debug!(job = %id, "job runner future finished");
    });

    active.insert(
        id,
        ActiveJob {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel(id: JobId, active: &mut HashMap<JobId, ActiveJob>) {
    let Some(existing) = active.get_mut(&id) else {
        debug!(job = %id, "cancel requested for unknown or finished job");
        return;
    };

    info!(job = %id, "cancellation requested; terminating process");

    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(job = %id, "process already finished while cancelling");
        }
    } else {
        debug!(job = %id, "no cancel sender present; process already being cancelled");
    }
}
