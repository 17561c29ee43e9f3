// src/fs/mock.rs

//! Fault-injecting filesystem for exercising failure paths.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};

use super::{FileSystem, RealFileSystem};

#[derive(Debug, Default)]
struct Faults {
    create_dir: Option<io::ErrorKind>,
    rename: Option<io::ErrorKind>,
    copy: Option<io::ErrorKind>,
    renames: usize,
    copies: usize,
}

/// Delegates to [`RealFileSystem`] but fails selected operations on demand.
///
/// Clones share the same fault table and counters.
#[derive(Debug, Clone, Default)]
pub struct FaultyFileSystem {
    inner: RealFileSystem,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create_dir(self, kind: io::ErrorKind) -> Self {
        self.lock().create_dir = Some(kind);
        self
    }

    pub fn fail_rename(self, kind: io::ErrorKind) -> Self {
        self.lock().rename = Some(kind);
        self
    }

    pub fn fail_copy(self, kind: io::ErrorKind) -> Self {
        self.lock().copy = Some(kind);
        self
    }

    /// Number of attempted renames, failed ones included.
    pub fn renames(&self) -> usize {
        self.lock().renames
    }

    /// Number of attempted file copies, failed ones included.
    pub fn copies(&self) -> usize {
        self.lock().copies
    }

    fn lock(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn injected(kind: io::ErrorKind, op: &str, path: &Path) -> Result<()> {
    Err::<(), _>(io::Error::from(kind)).with_context(|| format!("{op} {:?} (injected)", path))
}

impl FileSystem for FaultyFileSystem {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        if let Some(kind) = self.lock().create_dir {
            return injected(kind, "creating dir", path);
        }
        self.inner.create_dir_all(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.inner.write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let fault = {
            let mut faults = self.lock();
            faults.renames += 1;
            faults.rename
        };
        if let Some(kind) = fault {
            return injected(kind, "renaming", from);
        }
        self.inner.rename(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let fault = {
            let mut faults = self.lock();
            faults.copies += 1;
            faults.copy
        };
        if let Some(kind) = fault {
            return injected(kind, "copying", from);
        }
        self.inner.copy_file(from, to)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.remove_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }
}
