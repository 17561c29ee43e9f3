// src/config/model.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [tool]
/// command = "idevicebackup2"
/// subcommand = "backup"
/// full_flag = "--full"
/// global_args = ["-u", "00008030-001A2B3C4D5E6F70"]
///
/// [staging]
/// root = "/var/tmp/devbackup"
///
/// [supervisor]
/// kill_timeout_ms = 2000
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tool: ToolSection,

    #[serde(default)]
    pub staging: StagingSection,

    #[serde(default)]
    pub supervisor: SupervisorSection,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tool: ToolSection,
    pub staging: StagingSection,
    pub supervisor: SupervisorSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            tool: raw.tool,
            staging: raw.staging,
            supervisor: raw.supervisor,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[tool]` section: how to invoke the device backup CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSection {
    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default = "default_subcommand")]
    pub subcommand: String,

    /// Appended after the subcommand when a full backup is requested.
    #[serde(default = "default_full_flag")]
    pub full_flag: String,

    /// Options placed before the subcommand (device selection and the like).
    #[serde(default)]
    pub global_args: Vec<String>,
}

fn default_command() -> String {
    "idevicebackup2".to_string()
}

fn default_subcommand() -> String {
    "backup".to_string()
}

fn default_full_flag() -> String {
    "--full".to_string()
}

impl Default for ToolSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            subcommand: default_subcommand(),
            full_flag: default_full_flag(),
            global_args: Vec::new(),
        }
    }
}

impl ToolSection {
    /// Arguments for one backup run writing into `output_dir`:
    /// `[global_args..] <subcommand> [full_flag] <output_dir>`.
    pub fn backup_args(&self, full_backup: bool, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.global_args.iter().map(OsString::from).collect();
        args.push(OsString::from(&self.subcommand));
        if full_backup {
            args.push(OsString::from(&self.full_flag));
        }
        args.push(output_dir.as_os_str().to_owned());
        args
    }
}

/// `[staging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingSection {
    /// Parent directory for per-run staging directories.
    ///
    /// Defaults to `<system temp dir>/devbackup`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl StagingSection {
    pub fn resolve_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("devbackup"))
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    /// How long drain-and-kill waits for each killed child to be reaped.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,
}

fn default_kill_timeout_ms() -> u64 {
    2000
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            kill_timeout_ms: default_kill_timeout_ms(),
        }
    }
}

impl SupervisorSection {
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}
