// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod status;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::command::CommandBuilder;
use crate::config::{ConfigFile, RawConfigFile, load_or_default};
use crate::errors::AutoconvertError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{Phase, PipelineOptions, PipelineReport, Plan, Planner, run_pipeline};
use crate::queue::{DEFAULT_GRACE_PERIOD, JobState};
use crate::status::{DetailLog, JobObserver, LogObserver};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and command-line overrides
/// - planning (directory discovery, output folders, commands)
/// - the two-phase pipeline with real processes
/// - Ctrl-C handling
///
/// Returns `Ok(true)` if every job exited with code 0 and nothing was
/// canceled.
pub async fn run(args: CliArgs) -> Result<bool> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let verbosity = args.verbosity();

    let mut raw = load_or_default(fs.as_ref(), args.config.as_deref())
        .context("loading configuration")?;
    args.apply_to(&mut raw);
    absolutize_out_folders(&mut raw)?;
    let cfg = ConfigFile::try_from(raw)?;

    let inputs = args
        .input_folders
        .iter()
        .map(|p| std::path::absolute(p).with_context(|| format!("resolving {:?}", p)))
        .collect::<Result<Vec<PathBuf>>>()?;

    let builder = CommandBuilder::new(verbosity);
    let planner = Planner::new(fs.as_ref(), &cfg, builder).create_dirs(!args.dry_run);

    // A template error would fail every directory alike; abort the whole run.
    planner.check_templates()?;

    for input in &inputs {
        if verbosity.announces() {
            info!(input = %input.display(), "converting data");
        }
    }
    let plan = planner.plan(&inputs);

    for issue in &plan.skipped {
        warn!(dir = %issue.dir.display(), error = %issue.error, "skipping");
    }
    let bad_input = plan
        .skipped
        .iter()
        .any(|issue| matches!(issue.error, AutoconvertError::InputNotADirectory(_)));

    if args.dry_run {
        print_dry_run(&cfg, &plan);
        return Ok(!bad_input);
    }

    if plan.is_empty() {
        info!("nothing to convert");
        return Ok(!bad_input);
    }

    let (cancel_tx, cancel_rx) = mpsc::channel::<()>(1);

    // First Ctrl-C cancels the run, a second one quits without waiting.
    tokio::spawn(async move {
        match relay_interrupts(tokio::signal::ctrl_c, cancel_tx).await {
            Ok(()) => {
                warn!("interrupted again, exiting without waiting for jobs");
                std::process::exit(130);
            }
            Err(e) => eprintln!("failed to listen for Ctrl+C: {e}"),
        }
    });

    let details = Arc::new(DetailLog::new());
    let observers: Vec<Arc<dyn JobObserver>> = vec![
        Arc::new(LogObserver::new(verbosity)),
        Arc::clone(&details) as Arc<dyn JobObserver>,
    ];

    let options = PipelineOptions {
        max_processes: cfg.run().max_processes,
        verbosity,
        grace: DEFAULT_GRACE_PERIOD,
    };

    let report = run_pipeline(plan, options, observers, Arc::clone(&fs), cancel_rx).await?;
    print_summary(&report, &details);

    Ok(report.is_success() && !bad_input)
}

/// Waits for an interrupt, asks for cancellation, then waits for a second
/// one. Returns once the second interrupt arrives.
async fn relay_interrupts<F, Fut>(mut interrupt: F, cancel_tx: mpsc::Sender<()>) -> std::io::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    interrupt().await?;
    info!("canceling; interrupt again to exit immediately");
    let _ = cancel_tx.send(()).await;
    interrupt().await
}

/// Output folders are taken relative to the directory autoconvert was
/// started from, not to the jobs' working directories.
fn absolutize_out_folders(raw: &mut RawConfigFile) -> Result<()> {
    for folder in [&mut raw.flatten.out_folder, &mut raw.image.out_folder] {
        *folder = absolute(folder)?;
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving {:?}", path))
}

/// Dry-run output: every command that would run, per phase.
fn print_dry_run(cfg: &ConfigFile, plan: &Plan) {
    println!("autoconvert dry-run");
    println!("  run.max_processes = {}", cfg.run().max_processes);
    println!("  run.recursive = {}", cfg.run().recursive);
    println!("  run.overwrite = {}", cfg.run().overwrite);
    println!();

    if cfg.flatten().enabled {
        println!("{} ({}):", Phase::Flatten, plan.flatten.len());
        for job in &plan.flatten {
            println!("  - {}", job.label);
            if let Some(dir) = &job.working_dir {
                println!("      cd {}", dir.display());
            }
            println!("      {}", job.command_line());
        }
    }

    if cfg.image().enabled {
        println!("{} ({}):", Phase::Image, plan.image.len());
        for target in &plan.image {
            println!("  - {}", target.label);
            println!("      input:  {}", target.input_folder.display());
            println!("      output: {}", target.output_folder.display());
        }
    }

    if !plan.skipped.is_empty() {
        println!("skipped ({}):", plan.skipped.len());
        for issue in &plan.skipped {
            println!("  - {}: {}", issue.dir.display(), issue.error);
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(report: &PipelineReport, details: &DetailLog) {
    println!();
    for (phase, queue) in report.phases() {
        if queue.jobs.is_empty() {
            continue;
        }
        println!(
            "{phase}: {} done, {} failed, {} canceled",
            queue.count(|s| *s == JobState::FinishedOk),
            queue.failed().count(),
            queue.count(|s| *s == JobState::Canceled),
        );
    }

    for (phase, job) in report.failed_jobs() {
        println!();
        println!("{} [{}]", job.label, job.state);
        if let Some(log) = details.get(phase.name(), job.id) {
            for line in log.lines() {
                println!("  {line}");
            }
        }
    }

    if !report.skipped.is_empty() {
        println!();
        println!("skipped:");
        for issue in &report.skipped {
            println!("  {}: {}", issue.dir.display(), issue.error);
        }
    }

    if report.canceled {
        println!();
        println!("run canceled");
    }
}
