// src/lib.rs

pub mod backup;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod stream;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::backup::{BackupHandle, BackupResult, BackupTask};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::errors::{DevbackupError, Result};
use crate::exec::{ProcessSupervisor, ShutdownHooks};
use crate::fs::{RealFileSystem, ensure_writable_dir};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the destination precondition check
/// - the process supervisor and its shutdown hooks
/// - one backup task, streaming tool output to STDOUT
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(args.config.as_deref())?;
    apply_cli_overrides(&mut cfg, &args)?;

    let full_backup = !args.incremental;
    let staging_root = cfg.staging.resolve_root();

    if args.dry_run {
        print_dry_run(&cfg, &args.dest, full_backup, &staging_root);
        return Ok(());
    }

    ensure_writable_dir(&RealFileSystem, &args.dest)
        .map_err(|e| DevbackupError::Destination(format!("{e:#}")))?;

    let supervisor = Arc::new(ProcessSupervisor::new(cfg.supervisor.kill_timeout()));
    let hooks = ShutdownHooks::install(Arc::clone(&supervisor));

    let task = BackupTask::new(Arc::clone(&supervisor), cfg.tool.clone(), staging_root);
    let backup = task.start(args.dest.clone(), full_backup, print_line);

    let result = supervise_backup(backup, &hooks).await?;

    drop(hooks);
    report(result)
}

/// Wait for `backup`, reporting [`DevbackupError::Interrupted`] if a shutdown
/// cut it short.
///
/// An interrupt kills the tool, so the backup task still runs to completion
/// and discards its staging directory before this returns.
pub async fn supervise_backup(mut backup: BackupHandle, hooks: &ShutdownHooks) -> Result<BackupResult> {
    let result = tokio::select! {
        result = &mut backup => result,
        _ = hooks.interrupted() => backup.await,
    };

    if !result.success && hooks.is_interrupted() {
        warn!(
            destination = ?result.destination,
            failure = ?result.failure,
            "backup interrupted"
        );
        return Err(DevbackupError::Interrupted);
    }
    Ok(result)
}

fn apply_cli_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    if let Some(udid) = &args.udid {
        if udid.trim().is_empty() {
            return Err(DevbackupError::ConfigError("--udid must not be empty".to_string()));
        }
        cfg.tool.global_args.push("-u".to_string());
        cfg.tool.global_args.push(udid.clone());
    }
    Ok(())
}

fn print_line(line: String) {
    trace!(target: "devbackup::tool", "{}", line);
    println!("{line}");
}

fn report(result: BackupResult) -> Result<()> {
    match result.failure {
        None => {
            info!(
                destination = ?result.destination,
                entries = result.moved.len(),
                "backup finished"
            );
            Ok(())
        }
        Some(failure) => Err(DevbackupError::BackupFailed(failure.to_string())),
    }
}

/// Simple dry-run output: print the resolved command and locations.
fn print_dry_run(cfg: &ConfigFile, dest: &Path, full_backup: bool, staging_root: &Path) {
    let staging = staging_root.join("<run-id>");
    let args = cfg.tool.backup_args(full_backup, &staging);

    println!("devbackup dry-run");
    println!("  command: {} {}", cfg.tool.command, join_args(&args));
    println!("  staging root: {}", staging_root.display());
    println!("  destination: {}", dest.display());
    println!("  full backup: {full_backup}");
    println!("  kill timeout: {:?}", cfg.supervisor.kill_timeout());
}

fn join_args(args: &[std::ffi::OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
