// src/exec/supervisor.rs

//! Child-process supervisor: launch, stream output, drain-and-kill.

use std::ffi::OsStr;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::exec::registry::{ManagedProcess, ProcessRegistry};
use crate::exec::sink::LineSink;
use crate::stream::BoxedLineStream;

/// How long the output pipes may stay open after the child itself has
/// exited. Delivery to the sink is not bounded by this.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for process {pid:?}: {source}")]
    Wait {
        pid: Option<u32>,
        #[source]
        source: io::Error,
    },

    #[error("supervisor is shutting down; refusing to start '{0}'")]
    ShuttingDown(String),

    #[error("process waiter lost: {0}")]
    WaiterLost(String),
}

/// Outcome counters for one drain-and-kill pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub killed: usize,
    pub already_exited: usize,
    pub failed: usize,
}

/// Launches child processes and guarantees none of them outlives the
/// program.
///
/// Create one per program and share it through an `Arc`; tests create their
/// own isolated instance.
#[derive(Debug)]
pub struct ProcessSupervisor {
    registry: ProcessRegistry,
    kill_timeout: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KILL_TIMEOUT)
    }
}

impl ProcessSupervisor {
    pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(kill_timeout: Duration) -> Self {
        Self {
            registry: ProcessRegistry::new(),
            kill_timeout,
        }
    }

    /// Run `command` with `args`, forwarding every stdout/stderr line to
    /// `sink`.
    ///
    /// The child is registered before this returns. The returned future
    /// resolves with the exit code once the child has terminated and all of
    /// its output has been delivered; it fails if the child could not be
    /// started. If a descendant keeps the pipes open past the child's exit,
    /// reading stops after a short grace period; lines already read are
    /// still delivered before the future resolves.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<I, A, S>(self: &Arc<Self>, command: &str, args: I, sink: S) -> ExitCodeFuture
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
        S: LineSink,
    {
        if self.registry.is_closed() {
            return ExitCodeFuture::failed(SupervisorError::ShuttingDown(command.to_string()));
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                warn!(command, error = %source, "failed to start child process");
                return ExitCodeFuture::failed(SupervisorError::Spawn {
                    command: command.to_string(),
                    source,
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let process = Arc::new(ManagedProcess::new(
            self.registry.next_id(),
            command.to_string(),
            child,
        ));
        let pid = process.pid();

        if self.registry.insert(Arc::clone(&process)).is_err() {
            // Dropping the last handle kills the child (`kill_on_drop`).
            warn!(command, ?pid, "registry closed while starting child; killing it");
            return ExitCodeFuture::failed(SupervisorError::ShuttingDown(command.to_string()));
        }

        info!(command, ?pid, "started child process");

        // Unbounded so that readers reach EOF as soon as the pipes close,
        // however slow the sink is.
        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(spawn_pipe_reader(BoxedLineStream::boxed(stdout), "stdout", pid, line_tx.clone()));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_pipe_reader(BoxedLineStream::boxed(stderr), "stderr", pid, line_tx.clone()));
        }
        drop(line_tx);
        let forwarder = tokio::spawn(forward_lines(line_rx, sink));

        let supervisor = Arc::clone(self);
        let waiter = tokio::spawn(async move {
            let status = process.wait().await;
            supervisor.registry.remove(process.id());

            if tokio::time::timeout(OUTPUT_GRACE, join_all(readers.iter_mut())).await.is_err() {
                // A descendant still holds the pipes open.
                warn!(?pid, "child exited but its output pipes stayed open; detaching readers");
                readers.iter().for_each(JoinHandle::abort);
            }

            let delivered = match forwarder.await {
                Ok(delivered) => delivered,
                Err(err) => {
                    warn!(?pid, error = %err, "output forwarder failed");
                    0
                }
            };

            let status = status.map_err(|source| SupervisorError::Wait { pid, source })?;
            let code = exit_code(status);
            info!(
                command = %process.command(),
                ?pid,
                exit_code = code,
                lines = delivered,
                "child process exited"
            );
            Ok(code)
        });

        ExitCodeFuture::running(pid, waiter)
    }

    /// Drain-and-kill: close the registry, then kill and reap every process
    /// still in it.
    ///
    /// Blocks the calling thread until each child is reaped or its kill
    /// timeout expires. Per-process failures are logged and counted, never
    /// propagated. Calling this again is harmless.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.registry.close() {
            info!(live = self.registry.len(), "killing all child processes");
        }

        let mut report = ShutdownReport::default();
        while let Some(process) = self.registry.take_any() {
            match process.kill_and_reap(self.kill_timeout) {
                Ok(true) => {
                    debug!(pid = ?process.pid(), command = %process.command(), "killed child process");
                    report.killed += 1;
                }
                Ok(false) => report.already_exited += 1,
                Err(err) => {
                    warn!(
                        pid = ?process.pid(),
                        command = %process.command(),
                        error = %err,
                        "failed to kill child process"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn is_shutting_down(&self) -> bool {
        self.registry.is_closed()
    }

    /// Snapshot of the processes currently tracked.
    pub fn live_processes(&self) -> Vec<Arc<ManagedProcess>> {
        self.registry.snapshot()
    }
}

fn spawn_pipe_reader(
    mut lines: BoxedLineStream,
    pipe: &'static str,
    pid: Option<u32>,
    tx: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    trace!(?pid, pipe, "{}", line);
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(?pid, pipe, error = %err, "error reading child output");
                    break;
                }
            }
        }
    })
}

async fn forward_lines<S: LineSink>(mut rx: mpsc::UnboundedReceiver<String>, mut sink: S) -> usize {
    let mut delivered = 0;
    while let Some(line) = rx.recv().await {
        sink.on_line(line);
        delivered += 1;
    }
    delivered
}

/// Exit code of a terminated child; death by signal maps to `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

enum ExitState {
    Failed(Option<SupervisorError>),
    Running(JoinHandle<Result<i32, SupervisorError>>),
}

/// Resolves with a child's exit code.
///
/// Dropping it does not stop the child; the supervisor keeps tracking the
/// process until it exits or is killed.
pub struct ExitCodeFuture {
    pid: Option<u32>,
    state: ExitState,
}

impl ExitCodeFuture {
    fn failed(err: SupervisorError) -> Self {
        Self {
            pid: None,
            state: ExitState::Failed(Some(err)),
        }
    }

    fn running(pid: Option<u32>, waiter: JoinHandle<Result<i32, SupervisorError>>) -> Self {
        Self {
            pid,
            state: ExitState::Running(waiter),
        }
    }

    /// OS pid of the child, if it was started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Future for ExitCodeFuture {
    type Output = Result<i32, SupervisorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            ExitState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or_else(|| {
                SupervisorError::WaiterLost("exit future polled after completion".to_string())
            }))),
            ExitState::Running(waiter) => Pin::new(waiter).poll(cx).map(|joined| {
                joined.unwrap_or_else(|err| Err(SupervisorError::WaiterLost(err.to_string())))
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn exit_code_maps_signals() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // Raw wait status 9 == terminated by SIGKILL.
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }

    #[tokio::test]
    async fn failed_spawn_is_reported_through_the_future() {
        let supervisor = Arc::new(ProcessSupervisor::default());
        let exit = supervisor.run("/nonexistent/devbackup-tool", ["x"], |_line: String| {});

        assert!(exit.pid().is_none());
        assert!(matches!(exit.await, Err(SupervisorError::Spawn { .. })));
        assert!(supervisor.live_processes().is_empty());
    }

    #[tokio::test]
    async fn run_after_shutdown_is_refused() {
        let supervisor = Arc::new(ProcessSupervisor::default());
        assert_eq!(supervisor.shutdown(), ShutdownReport::default());
        assert!(supervisor.is_shutting_down());

        let exit = supervisor.run("true", std::iter::empty::<&str>(), |_line: String| {});
        assert!(matches!(exit.await, Err(SupervisorError::ShuttingDown(_))));
    }
}
