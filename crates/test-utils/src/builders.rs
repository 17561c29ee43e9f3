#![allow(dead_code)]

use std::path::Path;

use devbackup::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.config.tool.command = command.to_string();
        self
    }

    pub fn with_global_arg(mut self, arg: &str) -> Self {
        self.config.tool.global_args.push(arg.to_string());
        self
    }

    /// Run `script` through `sh` in place of the real backup tool.
    ///
    /// Going through `sh` avoids `ETXTBSY` races when tests write and exec
    /// scripts concurrently.
    pub fn with_fake_tool(self, script: &Path) -> Self {
        self.with_command("sh").with_global_arg(&script.to_string_lossy())
    }

    pub fn with_staging_root(mut self, root: &Path) -> Self {
        self.config.staging.root = Some(root.to_path_buf());
        self
    }

    pub fn with_kill_timeout_ms(mut self, ms: u64) -> Self {
        self.config.supervisor.kill_timeout_ms = ms;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
