//! Container storage engine for Glacier.
//!
//! Many small uploads are multiplexed into a few append-only tar archives
//! ("containers") whose paths are derived from the upload identifier.
//!
//! # Architecture
//!
//! - **Classifier + policy**: sniff the payload and decide whether to compress
//! - **Writer**: append one entry in place, overwriting the end-of-archive marker
//! - **Reader**: linear scan for the first entry with a matching name
//! - **Locks**: one exclusive lock per container, with a bounded wait
//! - **ContainerStore**: the facade tying these together

pub mod classify;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod policy;
pub mod reader;
pub mod store;
pub mod writer;

pub use classify::{ContentClassifier, ContentType, MagicClassifier};
pub use config::{parse_disk_usage_allowed, CompressionCodec, StoreConfig};
pub use entry::EntryMeta;
pub use error::{StoreError, StoreResult};
pub use lock::{ContainerLock, FileLockProvider, InProcessLockProvider, LockProvider};
pub use metrics::{MemoryMetrics, MetricsSink, NoopMetrics};
pub use policy::CompressionPolicy;
pub use store::{AppendReceipt, ContainerStore, StoredBlob};
