use glacier_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvictError {
    #[error("unable to measure disk usage of {path}: {source}")]
    DiskUsage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type EvictResult<T> = Result<T, EvictError>;
