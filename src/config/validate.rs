// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DevbackupError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DevbackupError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_tool(cfg)?;
    validate_supervisor(cfg)?;
    Ok(())
}

fn validate_tool(cfg: &RawConfigFile) -> Result<()> {
    let tool = &cfg.tool;

    for (key, value) in [
        ("command", &tool.command),
        ("subcommand", &tool.subcommand),
        ("full_flag", &tool.full_flag),
    ] {
        if value.trim().is_empty() {
            return Err(DevbackupError::ConfigError(format!(
                "[tool].{key} must not be empty"
            )));
        }
    }

    // Empty arguments would reach the tool as literal "" positionals.
    if let Some(idx) = tool.global_args.iter().position(|a| a.is_empty()) {
        return Err(DevbackupError::ConfigError(format!(
            "[tool].global_args[{idx}] is an empty string"
        )));
    }

    Ok(())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    if cfg.supervisor.kill_timeout_ms == 0 {
        return Err(DevbackupError::ConfigError(
            "[supervisor].kill_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
