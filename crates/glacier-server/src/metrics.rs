use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;

use glacier_store::metrics::{self, MetricsSink};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

enum Metric {
    Counter(Counter),
    Gauge(Gauge<f64, AtomicU64>),
}

/// [`MetricsSink`] backed by a Prometheus registry.
///
/// Names ending in `_total` become counters; the registry appends the suffix
/// itself, so the exposed name matches the constant. Everything else is a
/// gauge.
pub struct PrometheusMetrics {
    registry: Registry,
    metrics: HashMap<&'static str, Metric>,
}

const DESCRIPTIONS: &[(&str, &str)] = &[
    (metrics::RAWUPLOAD_PROCESSED, "The total number of uploads received"),
    (metrics::RAWUPLOAD_DONE, "The total number of uploads stored"),
    (metrics::GET_PROCESSED, "The total number of downloads served"),
    (metrics::TAR_FILES_OPEN, "Containers currently open"),
    (metrics::DISK_FREE, "Free bytes on the storage volume"),
    (metrics::DISK_USED_PERCENT, "Used space on the storage volume in percent"),
    (metrics::DATA_WINDOW_HOURS, "Age of the oldest stored container in hours"),
    (metrics::CONTAINERS_EVICTED, "The total number of containers evicted"),
    (metrics::EVICTION_LOCK_SKIPS, "Containers skipped by eviction because they were busy"),
];

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let mut metrics = HashMap::new();
        for &(name, help) in DESCRIPTIONS {
            let metric = match name.strip_suffix("_total") {
                Some(base) => {
                    let counter = Counter::default();
                    registry.register(base, help, counter.clone());
                    Metric::Counter(counter)
                }
                None => {
                    let gauge = Gauge::<f64, AtomicU64>::default();
                    registry.register(name, help, gauge.clone());
                    Metric::Gauge(gauge)
                }
            };
            metrics.insert(name, metric);
        }
        Self { registry, metrics }
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn increment(&self, name: &'static str) {
        match self.metrics.get(name) {
            Some(Metric::Counter(c)) => {
                c.inc();
            }
            Some(Metric::Gauge(g)) => {
                g.inc_by(1.0);
            }
            None => tracing::debug!(name, "unregistered metric"),
        }
    }

    fn set(&self, name: &'static str, value: f64) {
        match self.metrics.get(name) {
            Some(Metric::Gauge(g)) => {
                g.set(value);
            }
            Some(Metric::Counter(_)) => tracing::debug!(name, "counters cannot be set"),
            None => tracing::debug!(name, "unregistered metric"),
        }
    }

    fn add(&self, name: &'static str, delta: f64) {
        match self.metrics.get(name) {
            Some(Metric::Gauge(g)) => {
                g.inc_by(delta);
            }
            Some(Metric::Counter(c)) if delta >= 0.0 => {
                c.inc_by(delta as u64);
            }
            Some(Metric::Counter(_)) => tracing::debug!(name, delta, "counters cannot decrease"),
            None => tracing::debug!(name, "unregistered metric"),
        }
    }
}
