//! sync::lock
//!
//! Cross-process lock serializing index writes.
//!
//! # Design
//!
//! The index is a single serialized file; concurrent full-file rewrites
//! would corrupt it. Within one process the engine already funnels index
//! writes through an async mutex, but the assignment-download workflow
//! runs as a separate foreground process against the same tree, so the
//! barrier must hold across processes too. This lock is per-repository and
//! uses blocking acquisition with timeout.
//!
//! # Storage
//!
//! - `<git-dir>/stagesync.lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock must be held for the duration of every index write
//! - Lock is automatically released on drop (RAII pattern)

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::git::GitError;

/// Default timeout for lock acquisition (10 seconds).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling interval when waiting for lock (50ms).
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive lock guarding index writes for one repository.
///
/// The lock is automatically released when this guard is dropped (RAII
/// pattern), so it is always released even if the operation panics.
#[derive(Debug)]
pub struct IndexLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    file: Option<File>,
}

impl IndexLock {
    /// Get the lock file path for a repository's git directory.
    pub fn lock_path(git_dir: &Path) -> PathBuf {
        git_dir.join("stagesync.lock")
    }

    /// Acquire the index lock with blocking and timeout.
    ///
    /// Blocks until the lock is acquired or the timeout expires, polling
    /// at 50ms intervals.
    ///
    /// # Errors
    ///
    /// - [`GitError::LockTimeout`] if the timeout expires before acquiring
    /// - [`GitError::Filesystem`] if the lock file cannot be opened
    pub fn acquire(git_dir: &Path, timeout: Duration) -> Result<Self, GitError> {
        let path = Self::lock_path(git_dir);
        let deadline = Instant::now() + timeout;

        loop {
            match Self::try_acquire_internal(&path)? {
                Some(lock) => return Ok(lock),
                None => {
                    if Instant::now() >= deadline {
                        return Err(GitError::LockTimeout { path });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` if another process currently holds it.
    pub fn try_acquire(git_dir: &Path) -> Result<Option<Self>, GitError> {
        Self::try_acquire_internal(&Self::lock_path(git_dir))
    }

    /// Internal non-blocking lock acquisition.
    fn try_acquire_internal(path: &Path) -> Result<Option<Self>, GitError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| GitError::Filesystem {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                path: path.to_path_buf(),
                file: Some(file),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(GitError::Filesystem {
                path: path.to_path_buf(),
                message: format!("lock failed: {e}"),
            }),
        }
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    ///
    /// Called automatically on drop; useful when the guard must be
    /// released before it goes out of scope.
    pub fn release(&mut self) -> Result<(), GitError> {
        if let Some(file) = self.file.take() {
            file.unlock().map_err(|e| GitError::Filesystem {
                path: self.path.clone(),
                message: format!("unlock failed: {e}"),
            })?;
        }
        Ok(())
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        // Best-effort release on drop - ignore errors since we're dropping
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_is_inside_git_dir() {
        let path = IndexLock::lock_path(Path::new("/repo/.git"));
        assert_eq!(path, PathBuf::from("/repo/.git/stagesync.lock"));
    }

    #[test]
    fn acquire_succeeds_when_available() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = IndexLock::acquire(temp.path(), DEFAULT_LOCK_TIMEOUT).expect("acquire");
        assert!(lock.path().ends_with("stagesync.lock"));
    }

    #[test]
    fn release_allows_reacquire() {
        let temp = TempDir::new().expect("create temp dir");

        let mut lock = IndexLock::acquire(temp.path(), DEFAULT_LOCK_TIMEOUT).expect("acquire 1");
        lock.release().expect("release");

        let _again = IndexLock::acquire(temp.path(), DEFAULT_LOCK_TIMEOUT).expect("acquire 2");
    }

    #[test]
    fn drop_releases_lock() {
        let temp = TempDir::new().expect("create temp dir");

        {
            let _lock = IndexLock::acquire(temp.path(), DEFAULT_LOCK_TIMEOUT).expect("acquire 1");
            // released on drop
        }

        let second = IndexLock::try_acquire(temp.path()).expect("try acquire");
        assert!(second.is_some());
    }

    #[test]
    fn timeout_is_reasonable() {
        assert!(DEFAULT_LOCK_TIMEOUT >= Duration::from_secs(5));
        assert!(DEFAULT_LOCK_TIMEOUT <= Duration::from_secs(60));
    }
}
