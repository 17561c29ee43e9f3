// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `devbackup`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devbackup",
    version,
    about = "Back up a connected device through its backup CLI, streaming the tool's output.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory that receives the finished backup.
    ///
    /// Must already exist and be writable.
    #[arg(long, value_name = "DIR")]
    pub dest: PathBuf,

    /// Run an incremental backup instead of a full one.
    #[arg(long)]
    pub incremental: bool,

    /// Path to the config file (TOML).
    ///
    /// If omitted, `Devbackup.toml` in the current directory is used when it
    /// exists, otherwise built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Back up the device with this UDID instead of the first one found.
    #[arg(long, value_name = "UDID")]
    pub udid: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVBACKUP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the command that would run, but don't run it.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
