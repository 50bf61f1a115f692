//! Per-container mutual exclusion.
//!
//! Every append, read and eviction delete of a container holds its lock.
//! Waits are bounded: a lock that cannot be taken within the timeout is
//! reported as [`StoreError::LockTimeout`] and never retried here.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;
use tracing::trace;

use crate::error::{StoreError, StoreResult};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Acquires exclusive per-path locks.
pub trait LockProvider: Send + Sync {
    /// Take the lock on `path`, waiting at most `timeout`.
    fn try_acquire(&self, path: &Path, timeout: Duration) -> StoreResult<ContainerLock>;

    /// Like [`try_acquire`](Self::try_acquire), but `path` is never created.
    /// A container that is missing, or disappears while waiting, is
    /// [`StoreError::NotFound`].
    fn try_acquire_existing(&self, path: &Path, timeout: Duration) -> StoreResult<ContainerLock>;
}

fn missing(path: &Path) -> StoreError {
    StoreError::NotFound(path.display().to_string())
}

enum Held {
    File(File),
    Table(Arc<LockTable>),
}

/// RAII guard; the lock is released when this is dropped.
pub struct ContainerLock {
    path: PathBuf,
    held: Held,
}

impl ContainerLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for ContainerLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerLock").field("path", &self.path).finish()
    }
}

impl Drop for ContainerLock {
    fn drop(&mut self) {
        match &self.held {
            Held::File(file) => {
                // Closing the descriptor releases the lock as well.
                let _ = FileExt::unlock(file);
            }
            Held::Table(table) => table.release(&self.path),
        }
        trace!(path = ?self.path, "container lock released");
    }
}

/// OS advisory locks (`flock`) on the container file itself, so writers in
/// other processes are excluded too.
///
/// [`try_acquire`](LockProvider::try_acquire) creates the file if missing.
/// An empty container is valid, so this never produces an unreadable file.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileLockProvider;

impl FileLockProvider {
    fn acquire(path: &Path, timeout: Duration, create: bool) -> StoreResult<ContainerLock> {
        let started = Instant::now();
        loop {
            let file = match OpenOptions::new()
                .read(true)
                .write(true)
                .create(create)
                .truncate(false)
                .open(path)
            {
                Ok(file) => file,
                Err(e) if !create && e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(missing(path))
                }
                Err(e) => return Err(e.into()),
            };
            if file.try_lock_exclusive()? {
                // The path may have been unlinked and recreated while we
                // waited; a lock on the old inode protects nothing.
                if is_same_file(&file, path)? {
                    trace!(path = ?path, waited = ?started.elapsed(), "container lock acquired");
                    return Ok(ContainerLock {
                        path: path.to_path_buf(),
                        held: Held::File(file),
                    });
                }
                continue;
            }
            drop(file);
            if started.elapsed() >= timeout {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: started.elapsed(),
                });
            }
            thread::sleep(POLL_INTERVAL.min(timeout));
        }
    }
}

impl LockProvider for FileLockProvider {
    fn try_acquire(&self, path: &Path, timeout: Duration) -> StoreResult<ContainerLock> {
        Self::acquire(path, timeout, true)
    }

    fn try_acquire_existing(&self, path: &Path, timeout: Duration) -> StoreResult<ContainerLock> {
        Self::acquire(path, timeout, false)
    }
}

#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> std::io::Result<bool> {
    Ok(path.exists())
}

#[derive(Default)]
struct LockTable {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl LockTable {
    fn entries(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, path: &Path) {
        self.entries().remove(path);
        self.released.notify_all();
    }
}

/// Lock table local to this process. Suitable when a single process owns
/// the storage tree, and for tests.
#[derive(Clone, Default)]
pub struct InProcessLockProvider {
    table: Arc<LockTable>,
}

impl InProcessLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locks currently held.
    pub fn held(&self) -> usize {
        self.table.entries().len()
    }
}

impl LockProvider for InProcessLockProvider {
    fn try_acquire(&self, path: &Path, timeout: Duration) -> StoreResult<ContainerLock> {
        let deadline = Instant::now() + timeout;
        let mut held = self.table.entries();
        while held.contains(path) {
            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: timeout,
                });
            }
            held = self
                .table
                .released
                .wait_timeout(held, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        held.insert(path.to_path_buf());
        Ok(ContainerLock {
            path: path.to_path_buf(),
            held: Held::Table(Arc::clone(&self.table)),
        })
    }

    fn try_acquire_existing(&self, path: &Path, timeout: Duration) -> StoreResult<ContainerLock> {
        if !path.exists() {
            return Err(missing(path));
        }
        let lock = self.try_acquire(path, timeout)?;
        // Deleted by the previous holder.
        if !path.exists() {
            return Err(missing(path));
        }
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn file_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00.tar");
        let provider = FileLockProvider;

        let guard = provider.try_acquire(&path, Duration::from_millis(50)).unwrap();
        assert_eq!(guard.path(), path.as_path());
        let err = provider.try_acquire(&path, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        drop(guard);
        provider.try_acquire(&path, Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn file_lock_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.tar");
        let _guard = FileLockProvider.try_acquire(&path, Duration::from_millis(50)).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn existing_lock_never_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("03.tar");
        let err = FileLockProvider
            .try_acquire_existing(&path, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!path.exists());

        std::fs::write(&path, b"").unwrap();
        FileLockProvider
            .try_acquire_existing(&path, Duration::from_millis(50))
            .unwrap();
    }

    #[test]
    fn existing_lock_sees_deletion_by_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("04.tar");
        let holder = FileLockProvider.try_acquire(&path, Duration::from_millis(50)).unwrap();

        let waiter = {
            let path = path.clone();
            thread::spawn(move || FileLockProvider.try_acquire_existing(&path, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(30));
        std::fs::remove_file(&path).unwrap();
        drop(holder);

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!path.exists());
    }

    #[test]
    fn in_process_existing_lock_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("05.tar");
        let provider = InProcessLockProvider::new();
        assert!(matches!(
            provider.try_acquire_existing(&path, Duration::from_millis(20)),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(provider.held(), 0);
        std::fs::write(&path, b"").unwrap();
        provider.try_acquire_existing(&path, Duration::from_millis(20)).unwrap();
    }

    #[test]
    fn file_lock_times_out_within_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("02.tar");
        let _guard = FileLockProvider.try_acquire(&path, Duration::from_millis(50)).unwrap();

        let started = Instant::now();
        let _ = FileLockProvider.try_acquire(&path, Duration::from_millis(100));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_secs(2));
    }

    #[test]
    fn in_process_lock_is_exclusive() {
        let provider = InProcessLockProvider::new();
        let path = Path::new("2024/01/01/00/aa.tar");

        let guard = provider.try_acquire(path, Duration::from_millis(20)).unwrap();
        assert_eq!(provider.held(), 1);
        assert!(provider.try_acquire(path, Duration::from_millis(20)).is_err());
        provider
            .try_acquire(Path::new("2024/01/01/00/bb.tar"), Duration::from_millis(20))
            .unwrap();

        drop(guard);
        assert_eq!(provider.held(), 0);
        provider.try_acquire(path, Duration::from_millis(20)).unwrap();
    }

    #[test]
    fn in_process_lock_hands_over_to_waiter() {
        let provider = InProcessLockProvider::new();
        let path = PathBuf::from("2024/01/01/00/cc.tar");
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                let path = path.clone();
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    let _guard = provider.try_acquire(&path, Duration::from_secs(10)).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(provider.held(), 0);
    }
}
