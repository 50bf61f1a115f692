use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use glacier_store::metrics::{self, MetricsSink};
use glacier_types::{bucket_time_from_path, CONTAINER_EXTENSION};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::EvictResult;

/// Age of the oldest data still on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetentionWindow {
    pub oldest: PathBuf,
    pub since: NaiveDateTime,
    pub hours: f64,
}

/// Publishes how far back the stored data reaches.
pub struct RetentionObserver {
    root: PathBuf,
    metrics: Arc<dyn MetricsSink>,
}

impl RetentionObserver {
    pub fn new(root: impl Into<PathBuf>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            root: root.into(),
            metrics,
        }
    }

    pub fn current_retention_window(&self) -> EvictResult<Option<RetentionWindow>> {
        self.observe_at(Utc::now().naive_utc())
    }

    /// Find the oldest container relative to `now` and publish its age.
    pub fn observe_at(&self, now: NaiveDateTime) -> EvictResult<Option<RetentionWindow>> {
        let Some((oldest, since)) = oldest_container(&self.root)? else {
            debug!(root = ?self.root, "no containers; retention window unknown");
            return Ok(None);
        };
        let hours = (now - since).num_seconds() as f64 / 3600.0;
        self.metrics.set(metrics::DATA_WINDOW_HOURS, hours);
        debug!(oldest = ?oldest, hours, "retention window");
        Ok(Some(RetentionWindow {
            oldest,
            since,
            hours,
        }))
    }
}

/// First container in traversal order. Directory names are zero-padded, so
/// sorted traversal visits buckets chronologically.
pub fn oldest_container(root: &Path) -> EvictResult<Option<(PathBuf, NaiveDateTime)>> {
    if !root.exists() {
        return Ok(None);
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        if !is_container(entry.path(), entry.file_type().is_file()) {
            continue;
        }
        match bucket_time_from_path(entry.path()) {
            Some(time) => return Ok(Some((entry.into_path(), time))),
            None => debug!(path = ?entry.path(), "container outside bucket layout"),
        }
    }
    Ok(None)
}

pub(crate) fn is_container(path: &Path, is_file: bool) -> bool {
    is_file && path.extension().map(|e| e == CONTAINER_EXTENSION).unwrap_or(false)
}
