// src/backup/mod.rs

//! One backup run, from staging to destination.
//!
//! - [`staging`] owns the per-run scratch directory.
//! - [`relocate`] moves finished output into the destination.
//! - [`task`] drives the backup tool through the supervisor and reports a
//!   [`BackupResult`].

pub mod relocate;
pub mod staging;
pub mod task;

pub use relocate::relocate_entries;
pub use staging::StagingDirectory;
pub use task::{BackupFailure, BackupHandle, BackupResult, BackupTask};
