use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glacier_store::metrics::{self, MetricsSink};
use tracing::warn;

use crate::disk::{DiskProbe, DiskUsage};
use crate::error::EvictResult;
use crate::task::BackgroundTask;

/// Samples disk usage of the storage root for observability.
pub struct DiskMonitor {
    root: PathBuf,
    probe: Arc<dyn DiskProbe>,
    metrics: Arc<dyn MetricsSink>,
}

impl DiskMonitor {
    pub fn new(root: impl Into<PathBuf>, probe: Arc<dyn DiskProbe>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            root: root.into(),
            probe,
            metrics,
        }
    }

    /// Take one sample and publish it.
    pub fn sample(&self) -> EvictResult<DiskUsage> {
        let usage = self.probe.usage(&self.root)?;
        self.metrics.set(metrics::DISK_USED_PERCENT, usage.used_percent);
        self.metrics.set(metrics::DISK_FREE, usage.free as f64);
        Ok(usage)
    }

    /// `(used_percent, free_bytes)` of the storage root.
    pub fn disk_usage(&self) -> EvictResult<(f64, u64)> {
        let usage = self.sample()?;
        Ok((usage.used_percent, usage.free))
    }

    /// Sample every `period` until stopped.
    pub fn spawn(self: Arc<Self>, period: Duration) -> BackgroundTask {
        BackgroundTask::spawn("disk-monitor", period, move || {
            if let Err(e) = self.sample() {
                warn!(error = %e, "disk sample failed");
            }
        })
    }
}
