use std::sync::Arc;

use glacier_evict::{DiskMonitor, DiskProbe, RetentionObserver};
use glacier_store::{ContainerStore, StoreConfig};

use crate::auth::AccessTokens;
use crate::config::ServerConfig;
use crate::metrics::PrometheusMetrics;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ContainerStore>,
    pub monitor: Arc<DiskMonitor>,
    pub retention: Arc<RetentionObserver>,
    pub probe: Arc<dyn DiskProbe>,
    pub metrics: Arc<PrometheusMetrics>,
    pub tokens: AccessTokens,
    pub disk_usage_allowed: u8,
    pub max_upload_size: usize,
}

impl AppState {
    /// Wire a store, its observers and a fresh Prometheus registry together.
    pub fn new(store_config: &StoreConfig, server: &ServerConfig, probe: Arc<dyn DiskProbe>) -> Self {
        let metrics = Arc::new(PrometheusMetrics::new());
        let store = ContainerStore::new(store_config).with_metrics(metrics.clone());
        let monitor = DiskMonitor::new(store.root(), Arc::clone(&probe), store.metrics());
        let retention = RetentionObserver::new(store.root(), store.metrics());
        Self {
            store: Arc::new(store),
            monitor: Arc::new(monitor),
            retention: Arc::new(retention),
            probe,
            metrics,
            tokens: AccessTokens::from_config(server),
            disk_usage_allowed: store_config.disk_usage_allowed,
            max_upload_size: server.max_upload_size,
        }
    }
}
