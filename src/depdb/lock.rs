// src/depdb/lock.rs

//! Advisory lock guarding the reverse-dependency store
//!
//! Readers take a shared lock and writers an exclusive one on the sibling
//! `.depdblock` file. The lock is held for a single logical operation and
//! released on drop.
//!
//! # Example
//!
//! ```ignore
//! use orchard::depdb::lock::{LockMode, StoreLock};
//!
//! let _guard = StoreLock::acquire(&lock_path, LockMode::Exclusive)?;
//! // ... read, modify and write the store ...
//! ```

use crate::Result;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Kind of lock to take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

/// Bounded retry schedule for contended locks
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    /// Delay before the first retry, doubled after each
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Fail immediately when the lock is held
    pub fn no_wait() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

/// Held lock on the store's lock file
pub struct StoreLock {
    /// `None` when the filesystem cannot lock at all
    file: Option<File>,
    path: PathBuf,
    mode: LockMode,
}

impl StoreLock {
    /// Take a lock with the default retry schedule
    pub fn acquire<P: AsRef<Path>>(path: P, mode: LockMode) -> Result<Self> {
        Self::acquire_with(path, mode, RetryPolicy::default())
    }

    /// Take a lock, retrying with exponential backoff while it is contended
    pub fn acquire_with<P: AsRef<Path>>(path: P, mode: LockMode, policy: RetryPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                crate::Error::LockError(format!("Cannot open lock file {:?}: {}", path, e))
            })?;

        let mut delay = policy.base_delay;
        for attempt in 0..=policy.retries {
            let outcome = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match outcome {
                Ok(()) => {
                    log::debug!("Acquired {} lock at {:?}", mode.as_str(), path);
                    return Ok(Self {
                        file: Some(file),
                        path,
                        mode,
                    });
                }
                Err(e) if is_unsupported(&e) => {
                    log::warn!(
                        "Filesystem does not support locking {:?}, continuing unlocked: {}",
                        path,
                        e
                    );
                    return Ok(Self {
                        file: None,
                        path,
                        mode,
                    });
                }
                Err(e) if is_contended(&e) => {
                    if attempt < policy.retries {
                        log::debug!(
                            "Lock {:?} busy, retry {} of {} in {:?}",
                            path,
                            attempt + 1,
                            policy.retries,
                            delay
                        );
                        thread::sleep(delay);
                        delay *= 2;
                    }
                }
                Err(e) => {
                    return Err(crate::Error::LockError(format!(
                        "Failed to take {} lock on {:?}: {}",
                        mode.as_str(),
                        path,
                        e
                    )));
                }
            }
        }

        Err(crate::Error::LockError(format!(
            "Could not take {} lock on {:?} after {} retries",
            mode.as_str(),
            path,
            policy.retries
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Whether an OS lock is actually held
    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            log::debug!("Released {} lock at {:?}", self.mode.as_str(), self.path);
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn is_unsupported(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::ENOLCK) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclusive_lock_excludes() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".depdblock");

        let held = StoreLock::acquire(&lock_path, LockMode::Exclusive).unwrap();
        assert!(held.is_locked());
        assert!(lock_path.exists());

        let err = StoreLock::acquire_with(&lock_path, LockMode::Shared, RetryPolicy::no_wait())
            .err()
            .unwrap();
        assert!(err.is_retryable());

        drop(held);
        assert!(StoreLock::acquire_with(&lock_path, LockMode::Exclusive, RetryPolicy::no_wait()).is_ok());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".depdblock");

        let _a = StoreLock::acquire(&lock_path, LockMode::Shared).unwrap();
        let _b = StoreLock::acquire_with(&lock_path, LockMode::Shared, RetryPolicy::no_wait()).unwrap();

        assert!(
            StoreLock::acquire_with(&lock_path, LockMode::Exclusive, RetryPolicy::no_wait()).is_err()
        );
    }

    #[test]
    fn test_retry_gives_up_after_backoff() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".depdblock");
        let _held = StoreLock::acquire(&lock_path, LockMode::Exclusive).unwrap();

        let policy = RetryPolicy {
            retries: 2,
            base_delay: Duration::from_millis(5),
        };
        let err = StoreLock::acquire_with(&lock_path, LockMode::Exclusive, policy)
            .err()
            .unwrap();
        assert!(matches!(err, crate::Error::LockError(ref msg) if msg.contains("2 retries")));
    }

    #[test]
    fn test_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("registry").join(".depdblock");

        let lock = StoreLock::acquire(&lock_path, LockMode::Exclusive).unwrap();
        assert_eq!(lock.path(), lock_path.as_path());
        assert_eq!(lock.mode(), LockMode::Exclusive);
    }
}
