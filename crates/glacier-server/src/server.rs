use std::future::Future;
use std::sync::Arc;

use glacier_evict::{DiskProbe, EvictionLoop, FsDiskProbe};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::GlacierConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Glacier HTTP server together with its background maintenance.
pub struct GlacierServer {
    config: GlacierConfig,
    state: AppState,
}

impl GlacierServer {
    pub fn new(config: GlacierConfig) -> Self {
        Self::with_probe(config, Arc::new(FsDiskProbe))
    }

    pub fn with_probe(config: GlacierConfig, probe: Arc<dyn DiskProbe>) -> Self {
        let state = AppState::new(&config.store, &config.server, probe);
        Self { config, state }
    }

    pub fn config(&self) -> &GlacierConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "unable to listen for ctrl-c");
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, running the eviction loop and disk
    /// monitor alongside. Both are stopped before returning.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        std::fs::create_dir_all(self.state.store.root())?;

        let eviction = Arc::new(EvictionLoop::for_store(
            &self.state.store,
            self.config.store.disk_usage_allowed,
            Arc::clone(&self.state.probe),
        ));
        let tasks = [
            eviction.spawn(self.config.eviction.interval()),
            Arc::clone(&self.state.monitor).spawn(self.config.eviction.monitor_interval()),
        ];

        let app = self.router();
        let listener = TcpListener::bind(&self.config.server.bind_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            root = ?self.state.store.root(),
            threshold = self.config.store.disk_usage_allowed,
            "Glacier server listening"
        );
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        info!("shutting down background tasks");
        for task in tasks {
            task.stop().await;
        }
        served
    }
}
