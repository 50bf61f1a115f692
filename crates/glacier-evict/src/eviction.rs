use std::sync::Arc;
use std::time::Duration;

use glacier_store::ContainerStore;
use tracing::{info, warn};

use crate::disk::DiskProbe;
use crate::error::EvictResult;
use crate::reclaim::{PassReport, SpaceReclaimer};
use crate::retention::RetentionObserver;
use crate::task::BackgroundTask;

/// One eviction cycle: publish the retention window, then reclaim space.
pub struct EvictionLoop {
    observer: RetentionObserver,
    reclaimer: SpaceReclaimer,
}

impl EvictionLoop {
    pub fn new(observer: RetentionObserver, reclaimer: SpaceReclaimer) -> Self {
        Self {
            observer,
            reclaimer,
        }
    }

    /// Wire the loop to a store, sharing its root, locks and metrics.
    pub fn for_store(store: &ContainerStore, threshold: u8, probe: Arc<dyn DiskProbe>) -> Self {
        let observer = RetentionObserver::new(store.root(), store.metrics());
        let reclaimer = SpaceReclaimer::new(
            store.root(),
            threshold,
            probe,
            store.lock_provider(),
            store.lock_timeout(),
            store.metrics(),
        );
        Self::new(observer, reclaimer)
    }

    pub fn observer(&self) -> &RetentionObserver {
        &self.observer
    }

    pub fn reclaimer(&self) -> &SpaceReclaimer {
        &self.reclaimer
    }

    /// Run one cycle. A failed retention observation does not prevent the
    /// reclamation pass.
    pub fn run_once(&self) -> EvictResult<PassReport> {
        if let Err(e) = self.observer.current_retention_window() {
            warn!(error = %e, "retention observation failed");
        }
        let report = self.reclaimer.run_pass()?;
        if report.triggered() {
            info!(
                deleted = report.deleted.len(),
                bytes = report.bytes_freed,
                skipped = report.lock_skips.len(),
                errors = report.errors.len(),
                used = report.final_used_percent,
                "eviction pass finished"
            );
        }
        Ok(report)
    }

    /// Run a cycle every `period` until stopped. Errors are logged and the
    /// next cycle retries.
    pub fn spawn(self: Arc<Self>, period: Duration) -> BackgroundTask {
        BackgroundTask::spawn("eviction", period, move || {
            if let Err(e) = self.run_once() {
                warn!(error = %e, "eviction cycle failed");
            }
        })
    }
}
