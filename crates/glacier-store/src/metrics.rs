use std::collections::HashMap;
use std::sync::Mutex;

/// Uploads accepted for processing.
pub const RAWUPLOAD_PROCESSED: &str = "rawupload_processed_total";
/// Uploads fully written to their container.
pub const RAWUPLOAD_DONE: &str = "rawupload_processed_total_done";
/// Entries served from containers.
pub const GET_PROCESSED: &str = "get_processed_total";
/// Containers currently held open under lock.
pub const TAR_FILES_OPEN: &str = "tar_files_open";
pub const DISK_FREE: &str = "disk_free";
pub const DISK_USED_PERCENT: &str = "disk_used_percent";
/// Age in hours of the oldest container still on disk.
pub const DATA_WINDOW_HOURS: &str = "current_data_window_in_hours";
pub const CONTAINERS_EVICTED: &str = "containers_evicted_total";
pub const EVICTION_LOCK_SKIPS: &str = "eviction_lock_skips_total";

/// Destination for operational metrics. Implementations must be safe to
/// call from any thread.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str);
    fn set(&self, name: &'static str, value: f64);
    fn add(&self, name: &'static str, delta: f64);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str) {}
    fn set(&self, _name: &'static str, _value: f64) {}
    fn add(&self, _name: &'static str, _delta: f64) {}
}

/// Keeps the latest value of every metric in memory.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    values: Mutex<HashMap<&'static str, f64>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> f64 {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0.0)
    }

    fn update(&self, name: &'static str, f: impl FnOnce(&mut f64)) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        f(values.entry(name).or_insert(0.0));
    }
}

impl MetricsSink for MemoryMetrics {
    fn increment(&self, name: &'static str) {
        self.update(name, |v| *v += 1.0);
    }

    fn set(&self, name: &'static str, value: f64) {
        self.update(name, |v| *v = value);
    }

    fn add(&self, name: &'static str, delta: f64) {
        self.update(name, |v| *v += delta);
    }
}

/// Holds a gauge up by one for as long as it lives.
pub(crate) struct GaugeGuard<'a> {
    sink: &'a dyn MetricsSink,
    name: &'static str,
}

impl<'a> GaugeGuard<'a> {
    pub(crate) fn new(sink: &'a dyn MetricsSink, name: &'static str) -> Self {
        sink.add(name, 1.0);
        Self { sink, name }
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.sink.add(self.name, -1.0);
    }
}
