//! Single-instance advisory file lock (§4.3 step 1, §5). Two concurrent
//! `run` invocations on the same lock file: exactly one proceeds, the other
//! exits with code 3 (§8 property 8).

use crate::error::OrchestratorError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub struct CycleLock {
    _file: File,
    path: PathBuf,
}

impl CycleLock {
    /// Attempts to acquire the exclusive lock. Non-blocking: returns
    /// `OrchestratorError::LockContention` immediately if another process
    /// holds it, rather than waiting.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| OrchestratorError::Configuration(format!("opening lock file: {e}")))?;
        file.try_lock_exclusive()
            .map_err(|_| OrchestratorError::LockContention)?;
        Ok(CycleLock { _file: file, path })
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        // try_lock_exclusive's lock is released when the fd closes; explicit
        // unlock here just makes the release deterministic rather than
        // depending on drop order of the OS handle.
        let _ = FileExt::unlock(&self._file);
        let _ = &self.path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_file_is_contended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.lock");
        let first = CycleLock::acquire(&path).unwrap();
        let second = CycleLock::acquire(&path);
        assert!(matches!(second, Err(OrchestratorError::LockContention)));
        drop(first);
        assert!(CycleLock::acquire(&path).is_ok());
    }
}
