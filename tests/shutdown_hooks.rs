#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use devbackup::backup::{BackupFailure, BackupTask};
use devbackup::errors::DevbackupError;
use devbackup::exec::{ProcessSupervisor, ShutdownHooks};
use devbackup::supervise_backup;
use devbackup_test_utils::builders::ConfigFileBuilder;
use devbackup_test_utils::fake_tool::FakeTool;
use devbackup_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn requested_shutdown_kills_children_and_wakes_waiters() -> TestResult {
    init_tracing();
    let supervisor = Arc::new(ProcessSupervisor::default());
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));

    let exit = supervisor.run("sleep", ["30"], |_line: String| {});
    let tracked = supervisor.live_processes();
    assert_eq!(tracked.len(), 1);
    assert!(!hooks.is_interrupted());

    hooks.request_shutdown();

    with_timeout(hooks.interrupted()).await;
    assert!(hooks.is_interrupted());
    assert!(tracked[0].has_exited());
    assert_eq!(with_timeout(exit).await?, 137);
    Ok(())
}

#[tokio::test]
async fn interrupted_stays_pending_without_a_signal() {
    init_tracing();
    let supervisor = Arc::new(ProcessSupervisor::default());
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));

    let waited = tokio::time::timeout(Duration::from_millis(50), hooks.interrupted()).await;
    assert!(waited.is_err());
    assert!(!supervisor.is_shutting_down());
}

#[tokio::test]
async fn dropping_hooks_kills_remaining_children() -> TestResult {
    init_tracing();
    let supervisor = Arc::new(ProcessSupervisor::default());
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));

    let exits: Vec<_> = (0..3)
        .map(|_| supervisor.run("sleep", ["30"], |_line: String| {}))
        .collect();
    let tracked = supervisor.live_processes();

    drop(hooks);

    assert!(supervisor.is_shutting_down());
    assert!(tracked.iter().all(|p| p.has_exited()));
    for exit in exits {
        assert_eq!(with_timeout(exit).await?, 137);
    }
    Ok(())
}

#[tokio::test]
async fn interrupted_backup_fails_and_cleans_up() -> TestResult {
    init_tracing();
    let scratch = tempfile::tempdir()?;
    let dest = scratch.path().join("dest");
    fs::create_dir(&dest)?;
    let script = FakeTool::new()
        .stdout_line("Backup Started")
        .sleeps(30.0)
        .creates_dir("Backup2024")
        .write_to(scratch.path(), "slow-backup.sh");
    let cfg = ConfigFileBuilder::new()
        .with_fake_tool(&script)
        .with_staging_root(&scratch.path().join("staging"))
        .build();

    let supervisor = Arc::new(ProcessSupervisor::default());
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));
    let task = BackupTask::new(Arc::clone(&supervisor), cfg.tool, cfg.staging.resolve_root());

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = task.start(dest.clone(), true, move |line: String| {
        let _ = tx.send(line);
    });
    assert_eq!(with_timeout(rx.recv()).await.as_deref(), Some("Backup Started"));

    hooks.request_shutdown();
    let result = with_timeout(handle).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(BackupFailure::ExitCode(137)));
    assert_eq!(fs::read_dir(&dest)?.count(), 0);
    assert_eq!(fs::read_dir(scratch.path().join("staging"))?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn interrupt_is_reported_only_after_staging_is_discarded() -> TestResult {
    init_tracing();
    let scratch = tempfile::tempdir()?;
    let dest = scratch.path().join("dest");
    fs::create_dir(&dest)?;
    let script = FakeTool::new()
        .stdout_line("Backup Started")
        .creates_dir("Backup2024")
        .sleeps(30.0)
        .write_to(scratch.path(), "slow-backup.sh");
    let cfg = ConfigFileBuilder::new()
        .with_fake_tool(&script)
        .with_staging_root(&scratch.path().join("staging"))
        .with_kill_timeout_ms(500)
        .build();

    let supervisor = Arc::new(ProcessSupervisor::new(cfg.supervisor.kill_timeout()));
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));
    let task = BackupTask::new(Arc::clone(&supervisor), cfg.tool, cfg.staging.resolve_root());

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = task.start(dest.clone(), true, move |line: String| {
        let _ = tx.send(line);
    });
    assert_eq!(with_timeout(rx.recv()).await.as_deref(), Some("Backup Started"));

    hooks.request_shutdown();
    let outcome = with_timeout(supervise_backup(handle, &hooks)).await;

    assert!(matches!(outcome, Err(DevbackupError::Interrupted)));
    // No grace period: the staging directory is already gone.
    assert_eq!(fs::read_dir(scratch.path().join("staging"))?.count(), 0);
    assert_eq!(fs::read_dir(&dest)?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn uninterrupted_backup_result_is_returned() -> TestResult {
    init_tracing();
    let scratch = tempfile::tempdir()?;
    let dest = scratch.path().join("dest");
    fs::create_dir(&dest)?;
    let script = FakeTool::new()
        .creates_dir("Backup2024")
        .write_to(scratch.path(), "backup.sh");
    let cfg = ConfigFileBuilder::new()
        .with_fake_tool(&script)
        .with_staging_root(&scratch.path().join("staging"))
        .build();

    let supervisor = Arc::new(ProcessSupervisor::default());
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));
    let task = BackupTask::new(Arc::clone(&supervisor), cfg.tool, cfg.staging.resolve_root());

    let handle = task.start(dest.clone(), true, |_line: String| {});
    let result = with_timeout(supervise_backup(handle, &hooks)).await?;

    assert!(result.success);
    assert!(dest.join("Backup2024").is_dir());
    assert!(!hooks.is_interrupted());
    Ok(())
}
