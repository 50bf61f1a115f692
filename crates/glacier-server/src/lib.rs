//! HTTP front end for Glacier.
//!
//! Exposes uploads (`/rawupload/:id`, `/upload`), downloads (`/get/:id`),
//! identifier generation (`/uuid`), operational status and Prometheus
//! metrics over axum. Storage calls run on the blocking pool; the eviction
//! loop and disk monitor run beside the listener for the server's lifetime.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Access, AccessTokens, TokenQuery};
pub use config::{GlacierConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use metrics::PrometheusMetrics;
pub use server::GlacierServer;
pub use state::AppState;
