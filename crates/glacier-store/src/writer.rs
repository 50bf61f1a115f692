//! Append-in-place container mutation.
//!
//! A non-empty container always ends with the tar end-of-archive marker (two
//! zero blocks). Appending seeks back over the marker, writes the new entry
//! and a fresh marker, so the cost does not depend on the container size.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tar::Builder;
use tracing::{debug, warn};

use crate::entry::EntryMeta;
use crate::error::{StoreError, StoreResult};

pub const BLOCK_SIZE: u64 = 512;
/// Length of the end-of-archive marker.
pub const TERMINATOR_LEN: u64 = 2 * BLOCK_SIZE;

/// Random-access storage a container can be appended to.
pub trait AppendTarget: Read + Write + Seek {
    fn current_len(&mut self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl AppendTarget for io::Cursor<Vec<u8>> {
    fn current_len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

/// Append one entry to `target`, returning the offset of its header.
///
/// If the write fails part-way the target is cut back to its previous
/// length, which restores the previous end-of-archive marker.
pub fn append_entry<T: AppendTarget>(
    target: &mut T,
    container: &Path,
    meta: &EntryMeta,
    payload: &[u8],
    mtime: u64,
) -> StoreResult<u64> {
    let len = target.current_len()?;
    let start = if len == 0 {
        0
    } else {
        verify_terminator(target, container, len)?;
        len - TERMINATOR_LEN
    };
    target.seek(SeekFrom::Start(start))?;

    if let Err(e) = write_entry(target, meta, payload, mtime) {
        warn!(container = ?container, error = %e, "append failed; restoring container");
        // Cutting back to `start` and re-extending refills the marker with zeros.
        target.truncate_to(start)?;
        target.truncate_to(len)?;
        return Err(e.into());
    }

    debug!(
        container = ?container,
        offset = start,
        stored = meta.stored_size,
        compressed = meta.compressed,
        "container append"
    );
    Ok(start)
}

fn write_entry<T: AppendTarget>(
    target: &mut T,
    meta: &EntryMeta,
    payload: &[u8],
    mtime: u64,
) -> io::Result<()> {
    let (mut header, pax) = meta.to_header(mtime);
    let mut builder = Builder::new(&mut *target);
    if !pax.is_empty() {
        builder.append_pax_extensions(pax.iter().map(|(k, v)| (*k, v.as_slice())))?;
    }
    builder.append_data(&mut header, &meta.name, payload)?;
    // Writes the new end-of-archive marker.
    builder.into_inner()?.flush()
}

fn verify_terminator<T: AppendTarget>(target: &mut T, container: &Path, len: u64) -> StoreResult<()> {
    let corrupt = |reason: &str| StoreError::CorruptContainer {
        path: container.to_path_buf(),
        reason: reason.to_string(),
    };
    if len < TERMINATOR_LEN || len % BLOCK_SIZE != 0 {
        return Err(corrupt("length is not a whole number of tar blocks"));
    }
    let mut tail = [0u8; TERMINATOR_LEN as usize];
    target.seek(SeekFrom::Start(len - TERMINATOR_LEN))?;
    target.read_exact(&mut tail)?;
    if tail.iter().any(|b| *b != 0) {
        return Err(corrupt("missing end-of-archive marker"));
    }
    Ok(())
}
