// src/exec/sink.rs

/// Receives the output of a child process, one line per call.
///
/// Lines from stdout and stderr arrive through the same sink in the order the
/// supervisor observes them, without trailing newlines. Calls are sequential
/// but happen on a runtime worker thread; a UI collaborator must hop back to
/// its own thread before touching UI state.
pub trait LineSink: Send + 'static {
    fn on_line(&mut self, line: String);
}

impl<F> LineSink for F
where
    F: FnMut(String) + Send + 'static,
{
    fn on_line(&mut self, line: String) {
        self(line)
    }
}
