// src/backup/relocate.rs

//! Move staged backup output into its destination.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::fs::FileSystem;

/// Move every immediate entry of `staging` into `destination`.
///
/// All target names are checked up front: if any of them already exists,
/// nothing is moved. Entries are renamed; when the rename crosses a
/// filesystem boundary the entry is copied and the source removed.
///
/// Returns the destination paths that were created, in name order.
pub fn relocate_entries(
    fs: &dyn FileSystem,
    staging: &Path,
    destination: &Path,
) -> Result<Vec<PathBuf>> {
    let mut plan = Vec::new();
    for entry in fs.read_dir(staging)? {
        let name = entry
            .file_name()
            .ok_or_else(|| anyhow!("staging entry {:?} has no file name", entry))?;
        let target = destination.join(name);
        if fs.exists(&target) {
            bail!("destination entry {:?} already exists", target);
        }
        plan.push((entry, target));
    }

    let mut moved = Vec::with_capacity(plan.len());
    for (from, to) in plan {
        move_entry(fs, &from, &to)?;
        debug!(from = ?from, to = ?to, "moved staged entry");
        moved.push(to);
    }
    Ok(moved)
}

fn move_entry(fs: &dyn FileSystem, from: &Path, to: &Path) -> Result<()> {
    let err = match fs.rename(from, to) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    if !crosses_devices(&err) {
        return Err(err);
    }

    debug!(from = ?from, to = ?to, "rename crosses filesystems; copying instead");
    copy_recursive(fs, from, to)
        .with_context(|| format!("copying {:?} to {:?} across filesystems", from, to))?;

    if fs.is_dir(from) {
        fs.remove_dir_all(from)
    } else {
        fs.remove_file(from)
    }
}

fn crosses_devices(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io_err| io_err.kind() == io::ErrorKind::CrossesDevices)
}

fn copy_recursive(fs: &dyn FileSystem, from: &Path, to: &Path) -> Result<()> {
    if !fs.is_dir(from) {
        return fs.copy_file(from, to);
    }

    fs.create_dir_all(to)?;
    for child in fs.read_dir(from)? {
        let name = child
            .file_name()
            .ok_or_else(|| anyhow!("entry {:?} has no file name", child))?;
        copy_recursive(fs, &child, &to.join(name))?;
    }
    Ok(())
}
