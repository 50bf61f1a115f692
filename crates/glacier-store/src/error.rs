use std::path::PathBuf;
use std::time::Duration;

use glacier_types::IdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identifier error: {0}")]
    Identifier(#[from] IdError),

    #[error("refusing to store an empty payload")]
    EmptyPayload,

    #[error("timed out after {waited:?} waiting for lock on {path:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("container {path:?} cannot be appended to: {reason}")]
    CorruptContainer { path: PathBuf, reason: String },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error was caused by caller input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Identifier(_) | Self::EmptyPayload)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
