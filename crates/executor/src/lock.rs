//! Advisory project lock.
//!
//! Exactly one migration (or rollback) may run against a project at a time.
//! A second invocation fails fast with `ProjectLocked` instead of blocking.

use common::error::MigrationError;
use common::manifest::STATE_DIR;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "lock";

/// Exclusive lock on a project root, released when dropped.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Acquires the lock, failing fast if another process (or another guard
    /// in this process) already holds it.
    pub fn acquire(project_root: &Path) -> Result<Self, MigrationError> {
        let dir = project_root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(MigrationError::ProjectLocked(path.display().to_string()))
            }
            Err(e) => Err(MigrationError::Io(e)),
        }
    }

    /// Path of the lock file (for diagnostics).
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let first = ProjectLock::acquire(dir.path()).unwrap();
        let err = ProjectLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, MigrationError::ProjectLocked(_)));
        drop(first);
        // Released on drop: a fresh acquire succeeds.
        let _second = ProjectLock::acquire(dir.path()).unwrap();
    }
}
