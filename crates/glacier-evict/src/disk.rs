use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvictError, EvictResult};

/// Space accounting of the filesystem holding the storage root.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    /// Free bytes, including blocks reserved for the superuser.
    pub free: u64,
    /// Free bytes available to unprivileged users.
    pub available: u64,
    /// `used / (used + available)`, in percent. Reserved blocks are not
    /// counted as usable space, matching `df`.
    pub used_percent: f64,
}

impl DiskUsage {
    pub fn from_stats(total: u64, free: u64, available: u64) -> Self {
        let used = total.saturating_sub(free);
        let usable = used + available;
        let used_percent = if usable == 0 {
            0.0
        } else {
            used as f64 / usable as f64 * 100.0
        };
        Self {
            total,
            free,
            available,
            used_percent,
        }
    }

    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.free)
    }

    /// Strictly above `threshold` percent.
    pub fn exceeds(&self, threshold: u8) -> bool {
        self.used_percent > f64::from(threshold)
    }
}

/// Measures disk usage for a path.
pub trait DiskProbe: Send + Sync {
    fn usage(&self, root: &Path) -> EvictResult<DiskUsage>;
}

/// Real filesystem statistics via `statvfs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsDiskProbe;

impl DiskProbe for FsDiskProbe {
    fn usage(&self, root: &Path) -> EvictResult<DiskUsage> {
        let stats = fs4::statvfs(root).map_err(|source| EvictError::DiskUsage {
            path: root.display().to_string(),
            source,
        })?;
        Ok(DiskUsage::from_stats(
            stats.total_space(),
            stats.free_space(),
            stats.available_space(),
        ))
    }
}
