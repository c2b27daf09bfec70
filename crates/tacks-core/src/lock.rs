//! Advisory single-writer lock for the state file.
//!
//! The sync cycle assumes exactly one process owns the state file at a time.
//! Rather than documenting that and hoping, each load-mutate-save cycle
//! holds an exclusive advisory lock on a `.lock` sibling of the state path.
//! A second instance gets a timeout error instead of silently losing writes.

use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Errors acquiring the state lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("state lock timed out after {waited:?} at {path} (another tacks instance running?)")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("state lock I/O error: {0}")]
    Io(#[from] io::Error),
}

/// RAII guard for the exclusive state-file lock. Released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock guarding `state_path`, polling until `timeout`.
    pub fn acquire(state_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let mut lock_path = state_path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self {
                    file,
                    path: lock_path,
                });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: lock_path,
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        let _ = FileExt::unlock(&self.file);
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, StateLock};
    use std::time::Duration;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = dir.path().join("state.json");
        let lock = StateLock::acquire(&state, Duration::from_millis(50)).expect("acquire");
        assert!(lock.path().ends_with("state.json.lock"));
        lock.release();
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = dir.path().join("state.json");
        let _held = StateLock::acquire(&state, Duration::from_millis(50)).expect("acquire");

        let err = StateLock::acquire(&state, Duration::from_millis(20)).expect_err("must time out");
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[test]
    fn release_allows_follow_up_acquire() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = dir.path().join("state.json");
        {
            let _first = StateLock::acquire(&state, Duration::from_millis(50)).expect("first");
        }
        let _second = StateLock::acquire(&state, Duration::from_millis(50)).expect("second");
    }
}
