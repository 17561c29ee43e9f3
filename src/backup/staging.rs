// src/backup/staging.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fs::FileSystem;

/// A uniquely named scratch directory for one backup attempt.
///
/// The directory is removed when the value is dropped unless
/// [`StagingDirectory::preserve`] was called, so every exit path of a
/// backup (including cancellation) either hands the contents off or
/// deletes them.
#[derive(Debug)]
pub struct StagingDirectory {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    armed: bool,
}

impl StagingDirectory {
    /// Create `<root>/<uuid>`, creating `root` as needed.
    pub fn create(fs: Arc<dyn FileSystem>, root: &Path) -> Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        debug!(staging = ?path, "creating staging directory");

        if let Err(err) = fs.create_dir_all(&path) {
            if fs.exists(&path) {
                let _ = fs.remove_dir_all(&path);
            }
            return Err(err);
        }

        Ok(Self {
            path,
            fs,
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively delete the directory now.
    pub fn discard(mut self) -> Result<()> {
        self.armed = false;
        if self.fs.exists(&self.path) {
            self.fs.remove_dir_all(&self.path)?;
        }
        Ok(())
    }

    /// Keep the directory on disk and return its path.
    pub fn preserve(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagingDirectory {
    fn drop(&mut self) {
        if !self.armed || !self.fs.exists(&self.path) {
            return;
        }
        if let Err(err) = self.fs.remove_dir_all(&self.path) {
            warn!(staging = ?self.path, error = %err, "failed to remove staging directory");
        }
    }
}
