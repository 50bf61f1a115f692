use std::io::{self, Read, Seek, Write};

use tar::Archive;
use tracing::debug;

use crate::codec;
use crate::entry::EntryMeta;
use crate::error::StoreResult;

/// Scan a container for the first entry called `name` and stream its payload
/// into `sink`, decompressing if needed.
///
/// Returns `None` when the end of the archive is reached without a match.
/// Payloads of non-matching entries are skipped by seeking.
pub fn find_entry<R: Read + Seek>(
    source: R,
    name: &str,
    sink: &mut dyn Write,
) -> StoreResult<Option<EntryMeta>> {
    let mut archive = Archive::new(source);
    let mut scanned = 0usize;
    for entry in archive.entries_with_seek()? {
        let mut entry = entry?;
        scanned += 1;
        if !entry.header().entry_type().is_file() || *entry.path_bytes() != *name.as_bytes() {
            continue;
        }
        let meta = EntryMeta::from_entry(&mut entry)?;
        if meta.compressed {
            codec::decompress_to(&mut entry, sink)?;
        } else {
            io::copy(&mut entry, sink)?;
        }
        debug!(name, scanned, compressed = meta.compressed, "container entry found");
        return Ok(Some(meta));
    }
    debug!(name, scanned, "container scanned without match");
    Ok(None)
}

/// Metadata of every entry in a container, in archive order.
pub fn list_entries<R: Read + Seek>(source: R) -> StoreResult<Vec<EntryMeta>> {
    let mut archive = Archive::new(source);
    let mut entries = Vec::new();
    for entry in archive.entries_with_seek()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            entries.push(EntryMeta::from_entry(&mut entry)?);
        }
    }
    Ok(entries)
}
