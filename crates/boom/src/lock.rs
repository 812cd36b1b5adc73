//! Path-keyed read/write locking.
//!
//! The storage engine never coordinates access on its own. Jobs that touch
//! shared directories go through a [`LockService`], normally backed by an
//! external coordination service. Retrying after a lost connection is up to
//! the caller.
//!
//! [`InProcessLockService`] implements the same contract inside one process:
//! any number of readers or a single writer per path.

use crate::error::{BoomError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Read/write locks keyed by path.
pub trait LockService: Send + Sync {
    /// Blocks until a shared lock on `path` is held.
    fn acquire_read(&self, path: &Path) -> Result<()>;

    /// Releases a shared lock.
    fn release_read(&self, path: &Path) -> Result<()>;

    /// Blocks until the exclusive lock on `path` is held.
    fn acquire_write(&self, path: &Path) -> Result<()>;

    /// Releases the exclusive lock.
    fn release_write(&self, path: &Path) -> Result<()>;
}

/// Holds a read lock until dropped.
pub struct ReadLockGuard<'a, L: LockService + ?Sized> {
    service: &'a L,
    path: PathBuf,
}

impl<'a, L: LockService + ?Sized> ReadLockGuard<'a, L> {
    /// Acquires a read lock on `path`.
    pub fn acquire(service: &'a L, path: &Path) -> Result<Self> {
        service.acquire_read(path)?;
        Ok(Self {
            service,
            path: path.to_path_buf(),
        })
    }

    /// Locked path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<L: LockService + ?Sized> Drop for ReadLockGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.service.release_read(&self.path) {
            warn!(path = %self.path.display(), "Failed to release read lock: {}", e);
        }
    }
}

/// Holds a write lock until dropped.
pub struct WriteLockGuard<'a, L: LockService + ?Sized> {
    service: &'a L,
    path: PathBuf,
}

impl<'a, L: LockService + ?Sized> WriteLockGuard<'a, L> {
    /// Acquires the write lock on `path`.
    pub fn acquire(service: &'a L, path: &Path) -> Result<Self> {
        service.acquire_write(path)?;
        Ok(Self {
            service,
            path: path.to_path_buf(),
        })
    }

    /// Locked path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<L: LockService + ?Sized> Drop for WriteLockGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.service.release_write(&self.path) {
            warn!(path = %self.path.display(), "Failed to release write lock: {}", e);
        }
    }
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// In-process [`LockService`].
#[derive(Debug, Default)]
pub struct InProcessLockService {
    locks: Mutex<HashMap<PathBuf, LockState>>,
    released: Condvar,
    timeout: Option<Duration>,
}

impl InProcessLockService {
    /// Creates a service whose acquire calls wait indefinitely.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service whose acquire calls fail after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Number of read locks currently held on `path`.
    pub fn readers(&self, path: &Path) -> usize {
        self.state()
            .map(|locks| locks.get(path).map_or(0, |s| s.readers))
            .unwrap_or(0)
    }

    /// Returns true if `path` is write-locked.
    pub fn is_write_locked(&self, path: &Path) -> bool {
        self.state()
            .map(|locks| locks.get(path).is_some_and(|s| s.writer))
            .unwrap_or(false)
    }

    fn state(&self) -> Result<MutexGuard<'_, HashMap<PathBuf, LockState>>> {
        self.locks
            .lock()
            .map_err(|_| BoomError::Lock("lock table poisoned".to_string()))
    }

    fn acquire<F>(&self, path: &Path, mode: &str, mut try_take: F) -> Result<()>
    where
        F: FnMut(&mut LockState) -> bool,
    {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut locks = self.state()?;
        loop {
            if try_take(locks.entry(path.to_path_buf()).or_default()) {
                trace!(path = %path.display(), mode, "lock acquired");
                return Ok(());
            }

            locks = match deadline {
                None => self
                    .released
                    .wait(locks)
                    .map_err(|_| BoomError::Lock("lock table poisoned".to_string()))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        if locks.get(path).is_some_and(|s| s.readers == 0 && !s.writer) {
                            locks.remove(path);
                        }
                        return Err(BoomError::Lock(format!(
                            "timed out waiting for {} lock on {}",
                            mode,
                            path.display()
                        )));
                    }
                    self.released
                        .wait_timeout(locks, deadline - now)
                        .map_err(|_| BoomError::Lock("lock table poisoned".to_string()))?
                        .0
                }
            };
        }
    }

    fn release<F>(&self, path: &Path, mode: &str, give_back: F) -> Result<()>
    where
        F: FnOnce(&mut LockState) -> bool,
    {
        let mut locks = self.state()?;
        let state = locks.get_mut(path).ok_or_else(|| {
            BoomError::Lock(format!("{} lock on {} is not held", mode, path.display()))
        })?;
        if !give_back(state) {
            return Err(BoomError::Lock(format!(
                "{} lock on {} is not held",
                mode,
                path.display()
            )));
        }
        if state.readers == 0 && !state.writer {
            locks.remove(path);
        }
        drop(locks);
        self.released.notify_all();
        Ok(())
    }
}

impl LockService for InProcessLockService {
    fn acquire_read(&self, path: &Path) -> Result<()> {
        self.acquire(path, "read", |state| {
            if state.writer {
                return false;
            }
            state.readers += 1;
            true
        })
    }

    fn release_read(&self, path: &Path) -> Result<()> {
        self.release(path, "read", |state| {
            if state.readers == 0 {
                return false;
            }
            state.readers -= 1;
            true
        })
    }

    fn acquire_write(&self, path: &Path) -> Result<()> {
        self.acquire(path, "write", |state| {
            if state.writer || state.readers > 0 {
                return false;
            }
            state.writer = true;
            true
        })
    }

    fn release_write(&self, path: &Path) -> Result<()> {
        self.release(path, "write", |state| std::mem::replace(&mut state.writer, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_shared_readers() {
        let locks = InProcessLockService::with_timeout(Duration::from_millis(50));
        let path = Path::new("/data/20130101/00");
        let a = ReadLockGuard::acquire(&locks, path).unwrap();
        let b = ReadLockGuard::acquire(&locks, path).unwrap();
        assert_eq!(locks.readers(path), 2);
        assert!(WriteLockGuard::acquire(&locks, path).is_err());

        drop(a);
        drop(b);
        assert_eq!(locks.readers(path), 0);
        let w = WriteLockGuard::acquire(&locks, path).unwrap();
        assert!(locks.is_write_locked(path));
        assert!(ReadLockGuard::acquire(&locks, path).is_err());
        drop(w);
        assert!(!locks.is_write_locked(path));
    }

    #[test]
    fn test_release_without_hold() {
        let locks = InProcessLockService::new();
        assert!(matches!(
            locks.release_read(Path::new("/x")),
            Err(BoomError::Lock(_))
        ));
        locks.acquire_read(Path::new("/x")).unwrap();
        assert!(locks.release_write(Path::new("/x")).is_err());
        locks.release_read(Path::new("/x")).unwrap();
    }

    #[test]
    fn test_writer_waits_for_reader() {
        let locks = Arc::new(InProcessLockService::new());
        let path = PathBuf::from("/data/out.bm");
        locks.acquire_read(&path).unwrap();

        let handle = {
            let locks = Arc::clone(&locks);
            let path = path.clone();
            thread::spawn(move || {
                let _guard = WriteLockGuard::acquire(locks.as_ref(), &path).unwrap();
                true
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!locks.is_write_locked(&path));
        locks.release_read(&path).unwrap();
        assert!(handle.join().unwrap());
    }
}
