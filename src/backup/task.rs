// src/backup/task.rs

//! Backup orchestration.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backup::relocate::relocate_entries;
use crate::backup::staging::StagingDirectory;
use crate::config::ToolSection;
use crate::exec::{LineSink, ProcessSupervisor};
use crate::fs::{FileSystem, RealFileSystem};

/// Why a backup did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupFailure {
    /// The staging directory could not be created; no process was started.
    Staging(String),
    /// The tool could not be started or waited on.
    Launch(String),
    /// The tool exited with a non-zero code (`128 + n` for signal `n`).
    ExitCode(i32),
    /// The tool succeeded but its output could not be moved. The staged
    /// data is left at `staging` for manual recovery.
    Relocation { staging: PathBuf, reason: String },
    /// The backup task itself died before producing a result.
    Aborted(String),
}

impl fmt::Display for BackupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupFailure::Staging(reason) => write!(f, "could not create staging directory: {reason}"),
            BackupFailure::Launch(reason) => write!(f, "could not run backup tool: {reason}"),
            BackupFailure::ExitCode(code) => write!(f, "backup tool exited with code {code}"),
            BackupFailure::Relocation { staging, reason } => write!(
                f,
                "could not move backup into place ({reason}); staged data kept at {}",
                staging.display()
            ),
            BackupFailure::Aborted(reason) => write!(f, "backup task aborted: {reason}"),
        }
    }
}

/// Final outcome of one [`BackupTask::start`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    pub success: bool,
    pub destination: PathBuf,
    /// Destination entries created by this run (empty on failure).
    pub moved: Vec<PathBuf>,
    pub failure: Option<BackupFailure>,
}

impl BackupResult {
    fn succeeded(destination: PathBuf, moved: Vec<PathBuf>) -> Self {
        Self {
            success: true,
            destination,
            moved,
            failure: None,
        }
    }

    fn failed(destination: PathBuf, failure: BackupFailure) -> Self {
        Self {
            success: false,
            destination,
            moved: Vec::new(),
            failure: Some(failure),
        }
    }
}

/// Runs the device backup tool into a staging directory and commits the
/// result into a destination directory.
///
/// Cheap to clone; each [`BackupTask::start`] is independent of the others.
#[derive(Debug, Clone)]
pub struct BackupTask {
    supervisor: Arc<ProcessSupervisor>,
    tool: ToolSection,
    staging_root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl BackupTask {
    pub fn new(supervisor: Arc<ProcessSupervisor>, tool: ToolSection, staging_root: PathBuf) -> Self {
        Self {
            supervisor,
            tool,
            staging_root,
            fs: Arc::new(RealFileSystem),
        }
    }

    /// Replace the filesystem used for staging and relocation.
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Program and arguments used for a run writing into `output_dir`.
    pub fn command_line(&self, full_backup: bool, output_dir: &Path) -> (String, Vec<OsString>) {
        (
            self.tool.command.clone(),
            self.tool.backup_args(full_backup, output_dir),
        )
    }

    /// Start a backup into `destination`.
    ///
    /// `destination` must be an existing, writable directory; that is the
    /// caller's responsibility. Tool output is streamed to `sink` while the
    /// backup runs. The returned handle resolves exactly once, after the
    /// tool has terminated and its output has been moved or discarded.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S: LineSink>(
        &self,
        destination: impl Into<PathBuf>,
        full_backup: bool,
        sink: S,
    ) -> BackupHandle {
        let destination = destination.into();
        let job = self.clone();
        let handle = tokio::spawn(job.execute(destination.clone(), full_backup, sink));
        BackupHandle {
            destination,
            handle,
        }
    }

    async fn execute<S: LineSink>(self, destination: PathBuf, full_backup: bool, sink: S) -> BackupResult {
        let staging = match StagingDirectory::create(Arc::clone(&self.fs), &self.staging_root) {
            Ok(staging) => staging,
            Err(err) => {
                error!(root = ?self.staging_root, error = %format!("{err:#}"), "cannot create staging directory");
                return BackupResult::failed(destination, BackupFailure::Staging(format!("{err:#}")));
            }
        };

        let (program, args) = self.command_line(full_backup, staging.path());
        info!(
            command = %program,
            ?args,
            staging = ?staging.path(),
            destination = ?destination,
            full_backup,
            "starting backup"
        );

        let failure = match self.supervisor.run(&program, &args, sink).await {
            Ok(0) => return self.commit(staging, destination).await,
            Ok(code) => BackupFailure::ExitCode(code),
            Err(err) => BackupFailure::Launch(err.to_string()),
        };

        warn!(destination = ?destination, %failure, "backup failed; discarding staging directory");
        discard(staging);
        BackupResult::failed(destination, failure)
    }

    /// Move staged output into `destination` and clean up.
    async fn commit(&self, staging: StagingDirectory, destination: PathBuf) -> BackupResult {
        let fs = Arc::clone(&self.fs);
        let from = staging.path().to_path_buf();
        let to = destination.clone();
        let relocated = tokio::task::spawn_blocking(move || relocate_entries(fs.as_ref(), &from, &to))
            .await
            .unwrap_or_else(|join_err| Err(anyhow::anyhow!("relocation task failed: {join_err}")));

        match relocated {
            Ok(moved) => {
                info!(destination = ?destination, entries = moved.len(), "backup completed");
                discard(staging);
                BackupResult::succeeded(destination, moved)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                let kept = staging.preserve();
                error!(staging = ?kept, destination = ?destination, error = %reason, "relocation failed; keeping staged data");
                BackupResult::failed(destination, BackupFailure::Relocation { staging: kept, reason })
            }
        }
    }
}

fn discard(staging: StagingDirectory) {
    let path = staging.path().to_path_buf();
    if let Err(err) = staging.discard() {
        warn!(staging = ?path, error = %format!("{err:#}"), "failed to remove staging directory");
    }
}

/// Resolves with the [`BackupResult`] of a started backup.
///
/// Dropping the handle does not cancel the backup.
pub struct BackupHandle {
    destination: PathBuf,
    handle: JoinHandle<BackupResult>,
}

impl BackupHandle {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for BackupHandle {
    type Output = BackupResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|err| {
                BackupResult::failed(this.destination.clone(), BackupFailure::Aborted(err.to_string()))
            })
        })
    }
}
