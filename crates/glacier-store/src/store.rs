use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use glacier_types::{IdCodec, ResolvedId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{ContentClassifier, MagicClassifier};
use crate::codec;
use crate::config::{CompressionCodec, StoreConfig};
use crate::entry::EntryMeta;
use crate::error::{StoreError, StoreResult};
use crate::lock::{FileLockProvider, LockProvider};
use crate::metrics::{self, GaugeGuard, MetricsSink, NoopMetrics};
use crate::policy::CompressionPolicy;
use crate::reader;
use crate::writer;

/// Outcome of a successful append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// Identifier as supplied by the caller.
    pub id: String,
    pub normalized: String,
    /// Container path relative to the storage root.
    pub container: PathBuf,
    pub compressed: bool,
    pub stored_size: u64,
    pub original_size: u64,
    pub content_type: String,
    /// Byte offset of the entry header inside the container.
    pub offset: u64,
}

/// A payload read back from a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
    pub meta: EntryMeta,
    pub data: Vec<u8>,
}

/// Storage engine facade: resolves identifiers, serializes access per
/// container and appends to / reads from the container files.
pub struct ContainerStore {
    root: PathBuf,
    ids: IdCodec,
    policy: CompressionPolicy,
    codec: CompressionCodec,
    lock_timeout: Duration,
    classifier: Arc<dyn ContentClassifier>,
    locks: Arc<dyn LockProvider>,
    metrics: Arc<dyn MetricsSink>,
}

impl ContainerStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            root: config.data_folder.clone(),
            ids: config.id_codec(),
            policy: CompressionPolicy::new(config.strict_compression),
            codec: config.codec,
            lock_timeout: config.lock_timeout(),
            classifier: Arc::new(MagicClassifier),
            locks: Arc::new(FileLockProvider),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_lock_provider(mut self, locks: Arc<dyn LockProvider>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn id_codec(&self) -> IdCodec {
        self.ids
    }

    pub fn lock_provider(&self) -> Arc<dyn LockProvider> {
        Arc::clone(&self.locks)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn metrics(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.metrics)
    }

    pub fn resolve(&self, identifier: &str) -> StoreResult<ResolvedId> {
        Ok(self.ids.resolve(identifier)?)
    }

    /// Absolute location of a resolved identifier's container.
    pub fn container_path(&self, resolved: &ResolvedId) -> PathBuf {
        self.root.join(resolved.container())
    }

    /// Append `data` under `identifier`, creating the container if needed.
    pub fn append(&self, identifier: &str, data: &[u8]) -> StoreResult<AppendReceipt> {
        let resolved = self.resolve(identifier)?;
        if data.is_empty() {
            return Err(StoreError::EmptyPayload);
        }
        self.metrics.increment(metrics::RAWUPLOAD_PROCESSED);

        let content_type = self.classifier.classify(data);
        let compressed = self.policy.should_compress(data.len(), &content_type);
        // Compress before taking the lock so the critical section is pure I/O.
        let stored: Cow<'_, [u8]> = if compressed {
            Cow::Owned(codec::compress(self.codec, data)?)
        } else {
            Cow::Borrowed(data)
        };

        let path = self.container_path(&resolved);
        if let Some(parent) = path.parent() {
            create_private_dirs(parent)?;
        }

        let meta = EntryMeta {
            name: resolved.normalized.clone(),
            original_id: identifier.to_string(),
            content_type: Some(content_type.mime.clone()),
            compressed,
            stored_size: stored.len() as u64,
            original_size: compressed.then_some(data.len() as u64),
        };

        let offset = {
            let _lock = self.locks.try_acquire(&path, self.lock_timeout)?;
            let _open = GaugeGuard::new(self.metrics.as_ref(), metrics::TAR_FILES_OPEN);
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            writer::append_entry(&mut file, &path, &meta, &stored, unix_now())?
        };
        self.metrics.increment(metrics::RAWUPLOAD_DONE);

        debug!(
            id = %resolved.normalized,
            container = %resolved.bucket,
            size = data.len(),
            stored = meta.stored_size,
            compressed,
            "stored"
        );
        Ok(AppendReceipt {
            id: identifier.to_string(),
            normalized: resolved.normalized,
            container: resolved.bucket.relative_path(),
            compressed,
            stored_size: meta.stored_size,
            original_size: data.len() as u64,
            content_type: content_type.mime,
            offset,
        })
    }

    /// Stream the entry stored under `identifier` into `sink`.
    pub fn read_to(&self, identifier: &str, sink: &mut dyn Write) -> StoreResult<EntryMeta> {
        let resolved = self.resolve(identifier)?;
        let path = self.container_path(&resolved);
        let not_found = || StoreError::NotFound(resolved.normalized.clone());
        if !exists(&path)? {
            return Err(not_found());
        }

        let meta = {
            let _lock = match self.locks.try_acquire_existing(&path, self.lock_timeout) {
                Ok(lock) => lock,
                // Evicted between the existence check and the lock.
                Err(StoreError::NotFound(_)) => return Err(not_found()),
                Err(e) => return Err(e),
            };
            let _open = GaugeGuard::new(self.metrics.as_ref(), metrics::TAR_FILES_OPEN);
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
                Err(e) => return Err(e.into()),
            };
            reader::find_entry(file, &resolved.normalized, sink)?
        };
        let meta = meta.ok_or_else(not_found)?;
        self.metrics.increment(metrics::GET_PROCESSED);
        debug!(id = %resolved.normalized, container = %resolved.bucket, "served");
        Ok(meta)
    }

    /// Read the whole entry stored under `identifier` into memory.
    pub fn read(&self, identifier: &str) -> StoreResult<StoredBlob> {
        let mut data = Vec::new();
        let meta = self.read_to(identifier, &mut data)?;
        Ok(StoredBlob { meta, data })
    }

    /// Entries of a container. Relative paths are taken from the storage root.
    pub fn list(&self, container: &Path) -> StoreResult<Vec<EntryMeta>> {
        let path = if container.is_absolute() {
            container.to_path_buf()
        } else {
            self.root.join(container)
        };
        if !exists(&path)? {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let _lock = self.locks.try_acquire_existing(&path, self.lock_timeout)?;
        let _open = GaugeGuard::new(self.metrics.as_ref(), metrics::TAR_FILES_OPEN);
        reader::list_entries(File::open(&path)?)
    }
}

impl std::fmt::Debug for ContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerStore")
            .field("root", &self.root)
            .field("ids", &self.ids)
            .field("policy", &self.policy)
            .field("codec", &self.codec)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

fn exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn create_private_dirs(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dirs(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
