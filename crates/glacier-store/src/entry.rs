use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use tar::{EntryType, Header};

/// `mode` value marking a compressed payload.
pub const MODE_COMPRESSED: u32 = 1;
pub const MODE_RAW: u32 = 0;

/// Largest value the 8-byte ustar `uid` field holds in octal.
const USTAR_UID_MAX: u64 = 0o7777777;

const PAX_UNAME: &str = "uname";
const PAX_GNAME: &str = "gname";
const PAX_UID: &str = "uid";

/// Metadata of one container entry.
///
/// The ustar owner fields are repurposed: `mode` flags compression, `uid`
/// holds the uncompressed length, `uname` the caller's identifier and
/// `gname` the content type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Entry name: the normalized identifier.
    pub name: String,
    /// Identifier as originally supplied.
    pub original_id: String,
    pub content_type: Option<String>,
    pub compressed: bool,
    /// Bytes occupied in the container.
    pub stored_size: u64,
    /// Uncompressed length; only recorded for compressed entries.
    pub original_size: Option<u64>,
}

impl EntryMeta {
    /// Stored size over original size, for compressed entries.
    pub fn ratio(&self) -> Option<f64> {
        match self.original_size {
            Some(original) if original > 0 => Some(self.stored_size as f64 / original as f64),
            _ => None,
        }
    }

    /// Build the ustar header plus the PAX records for values that overflow it.
    pub(crate) fn to_header(&self, mtime: u64) -> (Header, Vec<(&'static str, Vec<u8>)>) {
        let mut header = Header::new_ustar();
        let mut pax = Vec::new();

        header.set_entry_type(EntryType::Regular);
        header.set_size(self.stored_size);
        header.set_mtime(mtime);
        header.set_gid(0);
        header.set_mode(if self.compressed { MODE_COMPRESSED } else { MODE_RAW });

        let uid = if self.compressed {
            self.original_size.unwrap_or(0)
        } else {
            0
        };
        if uid > USTAR_UID_MAX {
            pax.push((PAX_UID, uid.to_string().into_bytes()));
            header.set_uid(0);
        } else {
            header.set_uid(uid);
        }

        if header.set_username(&self.original_id).is_err() {
            pax.push((PAX_UNAME, self.original_id.clone().into_bytes()));
            let _ = header.set_username("");
        }
        if let Some(content_type) = &self.content_type {
            if header.set_groupname(content_type).is_err() {
                pax.push((PAX_GNAME, content_type.clone().into_bytes()));
                let _ = header.set_groupname("");
            }
        }

        (header, pax)
    }

    /// Decode metadata from a container entry, applying any PAX records.
    pub(crate) fn from_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> io::Result<Self> {
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let stored_size = entry.size();

        let (mode, uid, mut uname, mut gname) = {
            let header = entry.header();
            (
                header.mode()?,
                header.uid()?,
                header.username().ok().flatten().map(str::to_string),
                header.groupname().ok().flatten().map(str::to_string),
            )
        };
        if let Some(extensions) = entry.pax_extensions()? {
            for ext in extensions {
                let ext = ext?;
                match ext.key() {
                    Ok(PAX_UNAME) => uname = ext.value().ok().map(str::to_string),
                    Ok(PAX_GNAME) => gname = ext.value().ok().map(str::to_string),
                    _ => {}
                }
            }
        }

        let compressed = mode == MODE_COMPRESSED;
        Ok(Self {
            name,
            original_id: uname.unwrap_or_default(),
            content_type: gname.filter(|g| !g.is_empty()),
            compressed,
            stored_size,
            original_size: compressed.then_some(uid),
        })
    }
}
