use crate::{Error, Result};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default bound on how long lock acquisition may block on contention.
///
/// The lock itself is advisory and whole-repository: one exclusive holder
/// for mutating sessions, any number of shared holders for read-only ones.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held advisory lock on a repository's lock marker file.
///
/// Released when dropped. The marker file is never removed: other processes
/// may be blocked on it, and its content is irrelevant.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl RepoLock {
    /// Acquires the lock, retrying until `timeout` elapses.
    ///
    /// Returns `Error::LockTimeout` when another process holds a conflicting
    /// lock for the whole wait window, and `Error::LockFailed` for any other
    /// acquisition failure.
    pub fn acquire(lock_path: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|source| Error::LockFailed {
                path: lock_path.to_path_buf(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => break,
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout {
                            path: lock_path.to_path_buf(),
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(source) => {
                    return Err(Error::LockFailed {
                        path: lock_path.to_path_buf(),
                        source,
                    });
                }
            }
        }

        debug!(path = %lock_path.display(), ?mode, "acquired repository lock");
        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
            mode,
        })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "released repository lock");
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclusive_then_exclusive_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");

        let held = RepoLock::acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();
        let blocked = RepoLock::acquire(&path, LockMode::Exclusive, Duration::from_millis(250));
        assert!(matches!(blocked, Err(Error::LockTimeout { .. })));
        drop(held);

        // Free again once the holder is gone.
        RepoLock::acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");

        let first = RepoLock::acquire(&path, LockMode::Shared, Duration::from_secs(1)).unwrap();
        let second = RepoLock::acquire(&path, LockMode::Shared, Duration::from_millis(250));
        assert!(second.is_ok());
        drop(first);
    }

    #[test]
    fn test_shared_blocks_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");

        let reader = RepoLock::acquire(&path, LockMode::Shared, Duration::from_secs(1)).unwrap();
        let writer = RepoLock::acquire(&path, LockMode::Exclusive, Duration::from_millis(250));
        assert!(matches!(writer, Err(Error::LockTimeout { .. })));
        drop(reader);
    }
}
