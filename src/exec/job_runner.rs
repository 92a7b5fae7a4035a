// src/exec/job_runner.rs

//! Individual job process runner.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::{JobId, JobOutcome, OutputStream, QueueEvent};

use super::LaunchRequest;

/// How long to wait for output readers to drain after the process exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const CHUNK_SIZE: usize = 4096;

/// Run a single job process and report exactly one `JobCompleted` event.
///
/// - Launch failures become `JobOutcome::LaunchFailed`.
/// - If the cancel channel fires, the process is asked to terminate and is
///   killed if it is still alive after `grace`; the outcome is `Canceled`.
/// - stdout and stderr are forwarded chunk by chunk as `JobOutput` events.
pub async fn run_job(
    request: LaunchRequest,
    queue_tx: mpsc::Sender<QueueEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
    grace: Duration,
) {
    let id = request.id;

    let outcome = if cancel_rx.try_recv().is_ok() {
        debug!(job = %id, "canceled before launch");
        JobOutcome::Canceled
    } else {
        run_job_inner(request, &queue_tx, cancel_rx, grace).await
    };

    if queue_tx
        .send(QueueEvent::JobCompleted { id, outcome })
        .await
        .is_err()
    {
        debug!(job = %id, "queue closed before job completion was delivered");
    }
}

async fn run_job_inner(
    request: LaunchRequest,
    queue_tx: &mpsc::Sender<QueueEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
    grace: Duration,
) -> JobOutcome {
    let LaunchRequest { id, job } = request;

    debug!(
        job = %id,
        label = %job.label,
        cmd = %job.command_line(),
        cwd = ?job.working_dir,
        "starting job process"
    );

    let mut cmd = Command::new(&job.program);
    cmd.args(&job.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &job.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(job = %id, program = %job.program, error = %err, "failed to launch process");
            return JobOutcome::LaunchFailed(err.to_string());
        }
    };

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_output(id, OutputStream::Stdout, stdout, queue_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_output(id, OutputStream::Stderr, stderr, queue_tx.clone()));
    }

    // Either the process exits on its own, or cancellation is requested.
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => match status.code() {
                Some(code) => {
                    debug!(job = %id, exit_code = code, "job process exited");
                    JobOutcome::Exited(code)
                }
                None => {
                    warn!(job = %id, %status, "job process ended without exit code");
                    JobOutcome::Crashed
                }
            },
            Err(err) => {
                warn!(job = %id, error = %err, "waiting for job process failed");
                JobOutcome::Crashed
            }
        },

        Ok(()) = &mut cancel_rx => {
            info!(job = %id, label = %job.label, "terminating job process");
            if let Err(err) = terminate(&mut child, grace).await {
                warn!(job = %id, error = %err, "failed to stop job process");
            }
            JobOutcome::Canceled
        }
    };

    drain_output(id, readers).await;
    outcome
}

/// Ask `child` to terminate, then kill it if it outlives `grace`.
pub async fn terminate(child: &mut Child, grace: Duration) -> io::Result<()> {
    if let Err(err) = request_terminate(child) {
        debug!(error = %err, "terminate request failed; killing");
        return child.kill().await;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status.map(|_| ()),
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "process ignored terminate request; killing"
            );
            child.kill().await
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from),
        // Already reaped.
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

fn forward_output<R>(
    id: JobId,
    stream: OutputStream,
    mut pipe: R,
    queue_tx: mpsc::Sender<QueueEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let event = QueueEvent::JobOutput {
                        id,
                        stream,
                        chunk: buf[..n].to_vec(),
                    };
                    if queue_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(job = %id, ?stream, error = %err, "output read failed");
                    break;
                }
            }
        }
    })
}

/// Wait briefly for output readers; grandchildren holding the pipes open
/// must not keep the job from completing.
async fn drain_output(id: JobId, readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            debug!(job = %id, "output reader still open after exit; aborting");
            reader.abort();
        }
    }
}
