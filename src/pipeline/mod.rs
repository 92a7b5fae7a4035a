// src/pipeline/mod.rs

//! Two-phase conversion pipeline.
//!
//! Phase 1 (flatten) and phase 2 (image) each run in their own bounded
//! [`queue`](crate::queue). The only thing that starts phase 2 is phase 1's
//! "finished" announcement: image jobs read what flatten jobs write, so
//! phase 2 must not begin before phase 1 has fully drained.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::CommandBuilder;
use crate::errors::{AutoconvertError, Result};
use crate::exec::{ExecutorBackend, RealExecutorBackend};
use crate::fs::FileSystem;
use crate::queue::{
    DEFAULT_GRACE_PERIOD, DEFAULT_MAX_PROCESSES, Job, JobReport, JobState, QueueEvent,
    QueueHandle, QueueOptions, QueueReport, spawn_queue,
};
use crate::status::JobObserver;
use crate::types::Verbosity;

pub mod plan;

pub use plan::{ImageTarget, Plan, PlanIssue, Planner};

/// The two conversion phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Flatten,
    Image,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Flatten => "flatten",
            Phase::Image => "image",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Concurrency limit of each phase's queue.
    pub max_processes: usize,
    pub verbosity: Verbosity,
    /// Terminate-to-kill delay when canceling running jobs.
    pub grace: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_processes: DEFAULT_MAX_PROCESSES,
            verbosity: Verbosity::default(),
            grace: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub flatten: QueueReport,
    pub image: QueueReport,
    /// Directories never converted: planning issues plus image targets whose
    /// input folder could not be listed when phase 2 started.
    pub skipped: Vec<PlanIssue>,
    /// Whether the cancel trigger fired.
    pub canceled: bool,
}

impl PipelineReport {
    pub fn phases(&self) -> [(Phase, &QueueReport); 2] {
        [(Phase::Flatten, &self.flatten), (Phase::Image, &self.image)]
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = (Phase, &JobReport)> {
        self.phases()
            .into_iter()
            .flat_map(|(phase, report)| report.failed().map(move |job| (phase, job)))
    }

    /// No cancellation, and every job that ran exited with code 0.
    pub fn is_success(&self) -> bool {
        !self.canceled
            && self.phases().iter().all(|(_, report)| {
                report
                    .jobs
                    .iter()
                    .all(|job| job.state == JobState::FinishedOk)
            })
    }
}

/// Start `downstream` once `upstream` announces "finished".
///
/// Subscribes to `upstream` before returning, so call this before
/// `upstream.start()`. When `upstream` finishes, `prepare` turns its report
/// into jobs that are appended to `downstream`, and `downstream` is started.
/// If `upstream` was stopped, `prepare` is skipped and `downstream` is stopped
/// and started empty, which makes it announce "finished" straight away.
pub async fn chain<F>(
    upstream: &QueueHandle,
    downstream: QueueHandle,
    prepare: F,
) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce(&QueueReport) -> Vec<Job> + Send + 'static,
{
    let mut finished = upstream.subscribe().await?;
    let upstream_name = upstream.name().to_string();

    Ok(tokio::spawn(async move {
        let Some(report) = finished.recv().await else {
            // Upstream died; let downstream finish empty so nobody waits on it.
            let _ = downstream.stop().await;
            let _ = downstream.start().await;
            return Err(AutoconvertError::QueueClosed(upstream_name));
        };

        if report.stopped {
            debug!(upstream = %report.queue, downstream = downstream.name(), "upstream stopped; not chaining");
            downstream.stop().await?;
        } else {
            let jobs = prepare(&report);
            debug!(
                upstream = %report.queue,
                downstream = downstream.name(),
                jobs = jobs.len(),
                "chaining"
            );
            for job in jobs {
                downstream.append(job).await?;
            }
        }

        downstream.start().await
    }))
}

/// Run `plan` with real processes. A message on `cancel_rx` cancels the run.
pub async fn run_pipeline(
    plan: Plan,
    options: PipelineOptions,
    observers: Vec<Arc<dyn JobObserver>>,
    fs: Arc<dyn FileSystem>,
    cancel_rx: mpsc::Receiver<()>,
) -> Result<PipelineReport> {
    let grace = options.grace;
    run_pipeline_with(plan, options, observers, fs, cancel_rx, move |tx| {
        RealExecutorBackend::with_grace_period(tx, grace)
    })
    .await
}

/// Run `plan`, creating each queue's executor with `make_executor`.
///
/// On cancel, both queues are stopped (pending jobs become `Canceled`) and
/// every running job is canceled. The call returns once the image queue has
/// announced "finished".
pub async fn run_pipeline_with<E, F>(
    plan: Plan,
    options: PipelineOptions,
    observers: Vec<Arc<dyn JobObserver>>,
    fs: Arc<dyn FileSystem>,
    mut cancel_rx: mpsc::Receiver<()>,
    make_executor: F,
) -> Result<PipelineReport>
where
    E: ExecutorBackend + 'static,
    F: Fn(mpsc::Sender<QueueEvent>) -> E,
{
    let Plan {
        flatten: flatten_jobs,
        image: image_targets,
        skipped,
    } = plan;

    let queue_options = |phase: Phase| {
        QueueOptions::new(phase.name(), options.max_processes).verbosity(options.verbosity)
    };
    let (flatten, flatten_task) =
        spawn_queue(queue_options(Phase::Flatten), &observers, &make_executor);
    let (image, image_task) = spawn_queue(queue_options(Phase::Image), &observers, &make_executor);

    let mut image_done = image.subscribe().await?;

    let unresolved = Arc::new(Mutex::new(Vec::new()));
    let prepare = {
        let unresolved = Arc::clone(&unresolved);
        let builder = CommandBuilder::new(options.verbosity);
        move |_: &QueueReport| resolve_targets(&image_targets, fs.as_ref(), &builder, &unresolved)
    };
    let chain_task = chain(&flatten, image.clone(), prepare).await?;

    for job in flatten_jobs {
        flatten.append(job).await?;
    }
    flatten.start().await?;

    let mut canceled = false;
    loop {
        tokio::select! {
            done = image_done.recv() => {
                if done.is_none() {
                    warn!("image queue exited before finishing");
                }
                break;
            }
            Some(()) = cancel_rx.recv(), if !canceled => {
                canceled = true;
                info!("cancel requested; stopping queues");
                for queue in [&flatten, &image] {
                    ignore_closed(queue.stop().await)?;
                    ignore_closed(queue.cancel_running().await)?;
                }
            }
        }
    }

    for queue in [&flatten, &image] {
        ignore_closed(queue.shutdown().await)?;
    }
    chain_task.await.map_err(anyhow::Error::from)??;
    let flatten_report = flatten_task.await.map_err(anyhow::Error::from)??;
    let image_report = image_task.await.map_err(anyhow::Error::from)??;

    let mut skipped = skipped;
    skipped.append(&mut unresolved.lock().unwrap_or_else(PoisonError::into_inner));

    Ok(PipelineReport {
        flatten: flatten_report,
        image: image_report,
        skipped,
        canceled,
    })
}

fn resolve_targets(
    targets: &[ImageTarget],
    fs: &dyn FileSystem,
    builder: &CommandBuilder,
    unresolved: &Mutex<Vec<PlanIssue>>,
) -> Vec<Job> {
    let mut jobs = Vec::with_capacity(targets.len());
    for target in targets {
        match target.resolve(fs, builder) {
            Ok(job) => jobs.push(job),
            Err(error) => {
                warn!(folder = %target.input_folder.display(), %error, "cannot build image job");
                unresolved
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(PlanIssue {
                        dir: target.input_folder.clone(),
                        error,
                    });
            }
        }
    }
    jobs
}

/// A queue whose loop already exited has nothing left to stop.
fn ignore_closed(result: Result<()>) -> Result<()> {
    match result {
        Err(AutoconvertError::QueueClosed(_)) => Ok(()),
        other => other,
    }
}
