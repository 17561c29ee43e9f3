// src/exec/registry.rs

//! Live child-process registry.

use std::collections::HashMap;
use std::future::poll_fn;
use std::io;
use std::pin::pin;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::Child;
use tracing::debug;

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One OS child process owned by a supervisor.
///
/// The `Child` sits behind a short-lived lock so that the background waiter
/// and the shutdown drain can both observe it; neither holds the lock across
/// a suspension point.
#[derive(Debug)]
pub struct ManagedProcess {
    id: u64,
    pid: Option<u32>,
    command: String,
    child: Mutex<Child>,
}

impl ManagedProcess {
    pub(crate) fn new(id: u64, command: String, child: Child) -> Self {
        Self {
            id,
            pid: child.id(),
            command,
            child: Mutex::new(child),
        }
    }

    /// Registry key, unique per supervisor (OS pids can be reused).
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Non-blocking liveness probe.
    pub fn has_exited(&self) -> bool {
        match self.lock_child().try_wait() {
            Ok(status) => status.is_some(),
            Err(err) => {
                debug!(pid = ?self.pid, error = %err, "try_wait failed; treating process as gone");
                true
            }
        }
    }

    /// Wait for the process to terminate.
    ///
    /// Each poll takes the lock, polls a fresh `Child::wait` future and drops
    /// both again. `Child::wait` is cancel safe, so nothing is lost between
    /// polls, and a concurrent reap by [`ManagedProcess::kill_and_reap`] is
    /// observed on the next wake-up.
    pub(crate) async fn wait(&self) -> io::Result<ExitStatus> {
        poll_fn(|cx| {
            let mut child = self.lock_child();
            let wait = pin!(child.wait());
            wait.poll(cx)
        })
        .await
    }

    /// Kill the process and block until it has been reaped.
    ///
    /// Returns `Ok(false)` if the process had already exited. Safe to call
    /// from outside any async context.
    pub(crate) fn kill_and_reap(&self, timeout: Duration) -> io::Result<bool> {
        {
            let mut child = self.lock_child();
            if child.try_wait()?.is_some() {
                return Ok(false);
            }
            child.start_kill()?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.lock_child().try_wait()?.is_some() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("process {:?} did not exit within {timeout:?} after kill", self.pid),
                ));
            }
            std::thread::sleep(REAP_POLL_INTERVAL);
        }
    }

    fn lock_child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    live: HashMap<u64, Arc<ManagedProcess>>,
    closed: bool,
}

/// Concurrent collection of live [`ManagedProcess`]es.
///
/// Every entry leaves the registry exactly once: either the waiter removes
/// it after a normal reap, or the shutdown drain takes it. After
/// [`ProcessRegistry::close`] no new entries are accepted.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert a process; hands it back if the registry is already closed.
    pub fn insert(&self, process: Arc<ManagedProcess>) -> Result<(), Arc<ManagedProcess>> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(process);
        }
        state.live.insert(process.id(), process);
        Ok(())
    }

    pub fn remove(&self, id: u64) -> Option<Arc<ManagedProcess>> {
        self.lock_state().live.remove(&id)
    }

    /// Remove and return an arbitrary entry.
    pub fn take_any(&self) -> Option<Arc<ManagedProcess>> {
        let mut state = self.lock_state();
        let id = *state.live.keys().next()?;
        state.live.remove(&id)
    }

    /// Stop accepting new entries. Returns `true` for the call that closed it.
    pub fn close(&self) -> bool {
        let mut state = self.lock_state();
        !std::mem::replace(&mut state.closed, true)
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    pub fn len(&self) -> usize {
        self.lock_state().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<ManagedProcess>> {
        self.lock_state().live.values().cloned().collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
