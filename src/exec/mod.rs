// src/exec/mod.rs

//! Process execution layer.
//!
//! This module launches child processes with `tokio::process::Command`,
//! streams their output to a caller-supplied sink and makes sure no child
//! outlives the program.
//!
//! - [`sink`] defines the [`LineSink`] capability that receives output lines.
//! - [`registry`] tracks every live child in a [`ProcessRegistry`].
//! - [`supervisor`] owns the registry, launches children and implements
//!   drain-and-kill.
//! - [`shutdown`] wires Ctrl-C / SIGTERM and program exit to drain-and-kill.

pub mod registry;
pub mod shutdown;
pub mod sink;
pub mod supervisor;

pub use registry::{ManagedProcess, ProcessRegistry};
pub use shutdown::ShutdownHooks;
pub use sink::LineSink;
pub use supervisor::{ExitCodeFuture, ProcessSupervisor, ShutdownReport, SupervisorError};
