//! Background maintenance of a Glacier container tree.
//!
//! - [`SpaceReclaimer`] deletes whole containers, oldest first, while disk
//!   usage is above the configured threshold
//! - [`RetentionObserver`] publishes the age of the oldest container
//! - [`DiskMonitor`] samples used/free space for observability
//!
//! Each exposes a synchronous single-iteration method; [`BackgroundTask`]
//! runs them periodically on the tokio runtime until stopped.

pub mod config;
pub mod disk;
pub mod error;
pub mod eviction;
pub mod monitor;
pub mod reclaim;
pub mod retention;
pub mod task;

pub use config::EvictionConfig;
pub use disk::{DiskProbe, DiskUsage, FsDiskProbe};
pub use error::{EvictError, EvictResult};
pub use eviction::EvictionLoop;
pub use monitor::DiskMonitor;
pub use reclaim::{PassReport, SpaceReclaimer};
pub use retention::{oldest_container, RetentionObserver, RetentionWindow};
pub use task::BackgroundTask;
