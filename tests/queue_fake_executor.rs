// tests/queue_fake_executor.rs

mod common;
use crate::common::{TestResult, init_tracing, with_timeout};

use std::time::Duration;

use autoconvert::queue::{JobState, OutputStream, QueueOptions};
use autoconvert::status::JobEventKind;
use autoconvert_test_utils::builders::labelled;
use autoconvert_test_utils::fake_executor::{ExecEvent, ExecLog, FakeBehaviour, FakeScript};
use autoconvert_test_utils::{RecordingObserver, spawn_fake_queue};

const MS: Duration = Duration::from_millis(1);

async fn wait_until(cond: impl Fn() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(5 * MS).await;
        }
    })
    .await
}

#[tokio::test]
async fn limit_two_runs_four_jobs_in_fifo_waves() -> TestResult {
    init_tracing();

    let log = ExecLog::new();
    let script = FakeScript::uniform(30 * MS).with("J2", 10 * MS, FakeBehaviour::Exit(0));
    let (queue, task) = spawn_fake_queue(QueueOptions::new("test", 2), &log, script, None);

    let mut finished = queue.subscribe().await?;
    for label in ["J1", "J2", "J3", "J4"] {
        queue.append(labelled(label)).await?;
    }
    queue.start().await?;

    let report = with_timeout(finished.recv()).await.expect("queue finished");
    assert_eq!(report.jobs.len(), 4);
    assert!(report.all_ok());

    // Promotion order is FIFO and never more than two run at once.
    assert_eq!(log.launched(), vec!["J1", "J2", "J3", "J4"]);
    assert_eq!(log.max_concurrent("J"), 2);

    let events = log.events();
    let launched_at = |label: &str| {
        events
            .iter()
            .position(|e| *e == ExecEvent::Launched(label.to_string()))
            .unwrap()
    };
    let completions_before =
        |idx: usize| events[..idx].iter().filter(|e| matches!(e, ExecEvent::Completed(_))).count();

    assert_eq!(completions_before(launched_at("J2")), 0);
    assert_eq!(completions_before(launched_at("J3")), 1);
    assert_eq!(completions_before(launched_at("J4")), 2);

    // Finished fired only after every job, J4 included, completed.
    assert_eq!(completions_before(events.len()), 4);

    queue.shutdown().await?;
    let final_report = task.await??;
    assert_eq!(final_report, report);

    // Exactly one announcement for the single start cycle.
    assert!(finished.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn stop_before_start_runs_nothing() -> TestResult {
    init_tracing();

    let log = ExecLog::new();
    let observer = RecordingObserver::new();
    let (queue, task) = spawn_fake_queue(
        QueueOptions::new("test", 2),
        &log,
        FakeScript::uniform(10 * MS),
        Some(observer.clone()),
    );

    let mut finished = queue.subscribe().await?;
    for label in ["J1", "J2", "J3"] {
        queue.append(labelled(label)).await?;
    }
    queue.stop().await?;

    // Appends after stop are ignored.
    queue.append(labelled("late")).await?;
    queue.start().await?;

    let report = with_timeout(finished.recv()).await.expect("queue finished");
    assert!(report.stopped);
    assert_eq!(report.jobs.len(), 3);
    assert!(report.jobs.iter().all(|j| j.state == JobState::Canceled));
    assert!(log.launched().is_empty());
    assert_eq!(
        observer.transitions(),
        vec![
            ("J1".to_string(), JobEventKind::Canceled),
            ("J2".to_string(), JobEventKind::Canceled),
            ("J3".to_string(), JobEventKind::Canceled),
        ]
    );

    queue.shutdown().await?;
    task.await??;
    Ok(())
}

#[tokio::test]
async fn failed_jobs_do_not_stop_the_queue() -> TestResult {
    init_tracing();

    let log = ExecLog::new();
    let observer = RecordingObserver::new();
    let script = FakeScript::uniform(5 * MS)
        .with("J1", 5 * MS, FakeBehaviour::FailLaunch)
        .with("J2", 5 * MS, FakeBehaviour::Exit(3));
    let (queue, task) = spawn_fake_queue(
        QueueOptions::new("test", 1).exit_when_finished(true),
        &log,
        script,
        Some(observer.clone()),
    );

    for label in ["J1", "J2", "J3"] {
        queue.append(labelled(label)).await?;
    }
    queue.start().await?;

    let report = with_timeout(task).await??;
    let states: Vec<_> = report.jobs.iter().map(|j| j.state).collect();
    assert_eq!(
        states,
        vec![
            JobState::FinishedError { exit_code: None },
            JobState::FinishedError { exit_code: Some(3) },
            JobState::FinishedOk,
        ]
    );

    assert_eq!(
        observer.transitions(),
        vec![
            ("J1".to_string(), JobEventKind::Started),
            ("J1".to_string(), JobEventKind::Finished(None)),
            ("J2".to_string(), JobEventKind::Started),
            ("J2".to_string(), JobEventKind::Finished(Some(3))),
            ("J3".to_string(), JobEventKind::Started),
            ("J3".to_string(), JobEventKind::Finished(Some(0))),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn canceling_a_running_job_frees_its_slot() -> TestResult {
    init_tracing();

    let log = ExecLog::new();
    let observer = RecordingObserver::new();
    let script = FakeScript::uniform(5 * MS).with("J1", Duration::ZERO, FakeBehaviour::Hang);
    let (queue, task) = spawn_fake_queue(
        QueueOptions::new("test", 1).exit_when_finished(true),
        &log,
        script,
        Some(observer.clone()),
    );

    let hung = queue.append(labelled("J1")).await?;
    queue.append(labelled("J2")).await?;
    queue.start().await?;

    wait_until(|| log.launched() == vec!["J1"]).await;
    queue.cancel(hung).await?;

    let report = with_timeout(task).await??;
    assert_eq!(report.jobs[0].state, JobState::Canceled);
    assert_eq!(report.jobs[1].state, JobState::FinishedOk);
    assert!(log.events().contains(&ExecEvent::CancelRequested("J1".to_string())));
    assert!(
        observer
            .transitions()
            .contains(&("J1".to_string(), JobEventKind::Canceled))
    );
    Ok(())
}

#[tokio::test]
async fn output_reaches_observers() -> TestResult {
    init_tracing();

    let log = ExecLog::new();
    let observer = RecordingObserver::new();
    let script = FakeScript::uniform(5 * MS).with("J1", 5 * MS, FakeBehaviour::Print("hello".into()));
    let (queue, task) = spawn_fake_queue(
        QueueOptions::new("test", 1).exit_when_finished(true),
        &log,
        script,
        Some(observer.clone()),
    );

    queue.append(labelled("J1")).await?;
    queue.start().await?;
    with_timeout(task).await??;

    let output: Vec<_> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            JobEventKind::Output(stream, chunk) => Some((stream, chunk)),
            _ => None,
        })
        .collect();
    assert_eq!(output, vec![(OutputStream::Stdout, b"hello\n".to_vec())]);
    Ok(())
}

#[tokio::test]
async fn empty_queue_finishes_on_start() -> TestResult {
    init_tracing();

    let log = ExecLog::new();
    let (queue, task) = spawn_fake_queue(
        QueueOptions::new("empty", 2).exit_when_finished(true),
        &log,
        FakeScript::uniform(MS),
        None,
    );
    queue.start().await?;

    let report = with_timeout(task).await??;
    assert_eq!(report.cycle, 1);
    assert!(report.jobs.is_empty());
    Ok(())
}
