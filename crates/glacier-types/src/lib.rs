//! # glacier-types
//!
//! Identifier codec for Glacier.
//!
//! Every stored object is addressed by a UUID-shaped identifier. The
//! identifier alone determines which container holds the object:
//!
//! - **v1** identifiers carry an RFC-4122 timestamp; the container is the
//!   UTC hour of that timestamp.
//! - **v4** identifiers are *time-encoded*: their first thirteen characters
//!   spell `YYYYMMDD-HHmm`. An optional retention byte can push the
//!   container date forward by up to 127 months.
//!
//! Containers live at `YYYY/MM/DD/HH/<slot>.tar` below the storage root,
//! where `<slot>` is two hex characters taken from the identifier.

pub mod bucket;
pub mod error;
pub mod identifier;

pub use bucket::{bucket_time_from_path, Bucket, CONTAINER_EXTENSION};
pub use error::{IdError, IdResult};
pub use identifier::{extract, generate_identifier, generate_identifier_at, IdCodec, IdScheme, ResolvedId};
