//! Chronological space reclamation.
//!
//! A pass only starts deleting when usage is above the threshold. It then
//! walks the tree oldest-first and deletes whole containers, re-measuring
//! before each one; once usage is back under the threshold the rest of the
//! current directory is skipped.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glacier_store::metrics::{self, MetricsSink};
use glacier_store::{LockProvider, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::disk::DiskProbe;
use crate::error::EvictResult;
use crate::retention::is_container;

/// Summary of one reclamation pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    /// Deleted containers, in deletion order.
    pub deleted: Vec<PathBuf>,
    pub bytes_freed: u64,
    /// Containers left in place because their lock was busy.
    pub lock_skips: Vec<PathBuf>,
    pub errors: Vec<String>,
    /// Usage was above the threshold when the pass started.
    #[serde(default)]
    pub over_threshold: bool,
    pub initial_used_percent: f64,
    /// Last usage measured during the pass.
    pub final_used_percent: f64,
}

impl PassReport {
    /// Whether the pass found usage above the threshold.
    pub fn triggered(&self) -> bool {
        self.over_threshold
    }
}

/// Deletes the oldest containers until disk usage drops under the threshold.
pub struct SpaceReclaimer {
    root: PathBuf,
    threshold: u8,
    probe: Arc<dyn DiskProbe>,
    locks: Arc<dyn LockProvider>,
    lock_timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl SpaceReclaimer {
    pub fn new(
        root: impl Into<PathBuf>,
        threshold: u8,
        probe: Arc<dyn DiskProbe>,
        locks: Arc<dyn LockProvider>,
        lock_timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            root: root.into(),
            threshold,
            probe,
            locks,
            lock_timeout,
            metrics,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Run one pass over the tree.
    pub fn run_pass(&self) -> EvictResult<PassReport> {
        let usage = self.probe.usage(&self.root)?;
        let mut report = PassReport {
            initial_used_percent: usage.used_percent,
            final_used_percent: usage.used_percent,
            ..PassReport::default()
        };
        if !usage.exceeds(self.threshold) {
            debug!(used = usage.used_percent, threshold = self.threshold, "below threshold");
            return Ok(report);
        }
        report.over_threshold = true;
        info!(
            used = usage.used_percent,
            threshold = self.threshold,
            "disk usage above threshold; evicting oldest containers"
        );

        let mut walker = WalkDir::new(&self.root).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "eviction walk error");
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            if !is_container(entry.path(), entry.file_type().is_file()) {
                continue;
            }

            let usage = match self.probe.usage(&self.root) {
                Ok(usage) => usage,
                Err(e) => {
                    warn!(error = %e, "disk usage unavailable; ending pass");
                    report.errors.push(e.to_string());
                    return Ok(report);
                }
            };
            report.final_used_percent = usage.used_percent;
            if !usage.exceeds(self.threshold) {
                walker.skip_current_dir();
                continue;
            }

            let path = entry.into_path();
            let lock = match self.locks.try_acquire_existing(&path, self.lock_timeout) {
                Ok(lock) => lock,
                Err(StoreError::NotFound(_)) => {
                    debug!(path = ?path, "container already gone");
                    continue;
                }
                Err(StoreError::LockTimeout { waited, .. }) => {
                    warn!(path = ?path, waited = ?waited, "container busy; skipping");
                    self.metrics.increment(metrics::EVICTION_LOCK_SKIPS);
                    report.lock_skips.push(path);
                    continue;
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "unable to lock container");
                    report.errors.push(format!("{}: {e}", path.display()));
                    continue;
                }
            };
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = ?path, bytes = size, "evicted container");
                    self.metrics.increment(metrics::CONTAINERS_EVICTED);
                    report.bytes_freed += size;
                    report.deleted.push(path);
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "unable to delete container");
                    report.errors.push(format!("{}: {e}", path.display()));
                }
            }
            drop(lock);
        }

        match self.probe.usage(&self.root) {
            Ok(usage) => report.final_used_percent = usage.used_percent,
            Err(e) => {
                warn!(error = %e, used = report.final_used_percent, "final disk usage unavailable");
                report.errors.push(e.to_string());
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskUsage;
    use crate::error::EvictError;
    use glacier_store::{FileLockProvider, InProcessLockProvider, MemoryMetrics};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts the bytes of every file under the root against a fixed capacity.
    struct TreeProbe {
        capacity: u64,
    }

    impl DiskProbe for TreeProbe {
        fn usage(&self, root: &Path) -> EvictResult<DiskUsage> {
            let used: u64 = WalkDir::new(root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.metadata().map(|m| m.len()).unwrap_or(0))
                .sum();
            let free = self.capacity.saturating_sub(used);
            Ok(DiskUsage::from_stats(self.capacity, free, free))
        }
    }

    /// Answers like [`TreeProbe`] for the first `healthy` calls, then fails.
    struct FlakyProbe {
        inner: TreeProbe,
        healthy: usize,
        calls: AtomicUsize,
    }

    impl DiskProbe for FlakyProbe {
        fn usage(&self, root: &Path) -> EvictResult<DiskUsage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.healthy {
                return self.inner.usage(root);
            }
            Err(EvictError::DiskUsage {
                path: root.display().to_string(),
                source: std::io::Error::other("statvfs failed"),
            })
        }
    }

    fn write(root: &Path, rel: &str, len: usize) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    fn reclaimer(root: &Path, capacity: u64, threshold: u8, locks: Arc<dyn LockProvider>) -> SpaceReclaimer {
        SpaceReclaimer::new(
            root,
            threshold,
            Arc::new(TreeProbe { capacity }),
            locks,
            Duration::from_millis(20),
            Arc::new(MemoryMetrics::new()),
        )
    }

    /// Four 1000-byte containers spread over three hours.
    fn populate(root: &Path) -> Vec<PathBuf> {
        vec![
            write(root, "2024/01/01/00/00.tar", 1000),
            write(root, "2024/01/01/00/01.tar", 1000),
            write(root, "2024/01/01/01/00.tar", 1000),
            write(root, "2024/01/02/00/00.tar", 1000),
        ]
    }

    #[test]
    fn below_threshold_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        // 4000 of 10000 bytes: 40 %.
        let report = reclaimer(dir.path(), 10_000, 75, Arc::new(InProcessLockProvider::new()))
            .run_pass()
            .unwrap();
        assert!(!report.triggered());
        assert_eq!(report.initial_used_percent, 40.0);
    }

    #[test]
    fn deletes_oldest_first_until_below() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(dir.path());
        // 80 % used; 50 % allowed: two deletions bring it to 40 %.
        let report = reclaimer(dir.path(), 5_000, 50, Arc::new(InProcessLockProvider::new()))
            .run_pass()
            .unwrap();

        assert_eq!(report.deleted, paths[..2].to_vec());
        assert_eq!(report.bytes_freed, 2000);
        assert_eq!(report.final_used_percent, 40.0);
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
        assert!(paths[2].exists());
        assert!(paths[3].exists());
    }

    #[test]
    fn busy_container_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(dir.path());
        let locks = Arc::new(InProcessLockProvider::new());
        let _busy = locks.try_acquire(&paths[0], Duration::from_millis(20)).unwrap();

        // 80 % used; 70 % allowed: one deletion is enough.
        let report = reclaimer(dir.path(), 5_000, 70, locks.clone()).run_pass().unwrap();
        assert_eq!(report.lock_skips, vec![paths[0].clone()]);
        assert_eq!(report.deleted, vec![paths[1].clone()]);
        assert!(paths[0].exists());
        assert!(report.triggered());
    }

    #[test]
    fn everything_goes_if_still_above() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(dir.path());
        write(dir.path(), "README", 3000);
        // Non-container data keeps usage high: all containers are deleted.
        let report = reclaimer(dir.path(), 7_000, 5, Arc::new(InProcessLockProvider::new()))
            .run_pass()
            .unwrap();
        assert_eq!(report.deleted, paths);
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn over_threshold_without_containers_is_triggered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README", 9000);
        let report = reclaimer(dir.path(), 10_000, 50, Arc::new(InProcessLockProvider::new()))
            .run_pass()
            .unwrap();
        assert!(report.deleted.is_empty());
        assert!(report.over_threshold);
        assert!(report.triggered());
    }

    #[test]
    fn failed_final_measurement_keeps_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(dir.path());
        // Initial check plus one re-measurement per container, then failure.
        let probe = FlakyProbe {
            inner: TreeProbe { capacity: 5_000 },
            healthy: 5,
            calls: AtomicUsize::new(0),
        };
        let report = SpaceReclaimer::new(
            dir.path(),
            5,
            Arc::new(probe),
            Arc::new(InProcessLockProvider::new()),
            Duration::from_millis(20),
            Arc::new(MemoryMetrics::new()),
        )
        .run_pass()
        .unwrap();

        assert_eq!(report.deleted, paths);
        assert_eq!(report.bytes_freed, 4000);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("statvfs failed"));
        // Measured before the last deletion.
        assert_eq!(report.final_used_percent, 20.0);
    }

    #[test]
    fn vanished_container_is_not_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(dir.path());
        let locks = Arc::new(FileLockProvider);
        let held = locks.try_acquire(&paths[0], Duration::from_millis(20)).unwrap();
        let remover = {
            let path = paths[0].clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                fs::remove_file(&path).unwrap();
                drop(held);
            })
        };
        let reclaimer = SpaceReclaimer::new(
            dir.path(),
            5,
            Arc::new(TreeProbe { capacity: 5_000 }),
            locks,
            Duration::from_millis(500),
            Arc::new(MemoryMetrics::new()),
        );
        let report = reclaimer.run_pass().unwrap();
        remover.join().unwrap();

        assert!(!paths[0].exists());
        assert!(!report.deleted.contains(&paths[0]));
        assert_eq!(report.deleted, paths[1..].to_vec());
        assert!(report.errors.is_empty());
    }
}
