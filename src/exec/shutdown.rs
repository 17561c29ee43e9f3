// src/exec/shutdown.rs

//! Kill-all-children hooks for program termination.
//!
//! Two paths lead to [`ProcessSupervisor::shutdown`]:
//! - an external interrupt (Ctrl-C, plus SIGTERM on unix) caught by a
//!   background listener task;
//! - dropping [`ShutdownHooks`], which happens when the program returns
//!   normally or unwinds out of a panic.
//!
//! Both paths may fire; the drain is idempotent.

use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::exec::supervisor::ProcessSupervisor;

struct HookState {
    supervisor: Arc<ProcessSupervisor>,
    interrupted: watch::Sender<bool>,
}

impl HookState {
    fn fire(&self, reason: &str) {
        let report = self.supervisor.shutdown();
        info!(
            reason,
            killed = report.killed,
            already_exited = report.already_exited,
            failed = report.failed,
            "child processes drained"
        );
        self.interrupted.send_replace(true);
    }
}

/// Installed shutdown handlers for one supervisor.
///
/// Keep this alive for as long as children may run; dropping it drains the
/// supervisor.
pub struct ShutdownHooks {
    state: Arc<HookState>,
    interrupted: watch::Receiver<bool>,
    listener: JoinHandle<()>,
}

impl ShutdownHooks {
    /// Install the signal listener. Must be called from within a Tokio
    /// runtime.
    pub fn install(supervisor: Arc<ProcessSupervisor>) -> Self {
        let (tx, rx) = watch::channel(false);
        let state = Arc::new(HookState {
            supervisor,
            interrupted: tx,
        });

        let listener = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                match wait_for_signal().await {
                    Ok(signal) => {
                        info!(signal, "received shutdown signal");
                        state.fire(signal);
                    }
                    Err(err) => warn!(error = %err, "failed to listen for shutdown signals"),
                }
            })
        };

        Self {
            state,
            interrupted: rx,
            listener,
        }
    }

    /// Drain the supervisor as if an interrupt had arrived.
    pub fn request_shutdown(&self) {
        self.state.fire("requested");
    }

    /// Completes once an interrupt (or [`ShutdownHooks::request_shutdown`])
    /// has drained the supervisor. Never completes otherwise.
    pub async fn interrupted(&self) {
        let mut rx = self.interrupted.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.borrow()
    }
}

impl Drop for ShutdownHooks {
    fn drop(&mut self) {
        self.listener.abort();
        let report = self.state.supervisor.shutdown();
        if report.killed > 0 || report.failed > 0 {
            info!(
                killed = report.killed,
                failed = report.failed,
                "terminated child processes on exit"
            );
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
