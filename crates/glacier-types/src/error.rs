use thiserror::Error;

/// Errors produced while resolving an identifier to its container.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// No well-formed UUID-shaped substring was found.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The UUID parsed, but is neither version 1 nor version 4.
    #[error("unsupported identifier version {0}, expected 1 or 4")]
    UnsupportedVersion(usize),

    /// A v4 identifier that does not carry a `20YYMMDD-HH` time prefix.
    #[error("identifier is not time-encoded: {0}")]
    NotTimeEncoded(String),

    /// The embedded date could not be decoded into a calendar date.
    #[error("unable to decode date of identifier {0}")]
    DateDecode(String),
}

/// Result alias for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
