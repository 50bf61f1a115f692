//! Content sniffing.
//!
//! Classification only feeds the compression policy and the stored content
//! type, so it looks at a bounded prefix and never fails.

use serde::{Deserialize, Serialize};

/// Bytes inspected when deciding whether a payload is text.
const SNIFF_LEN: usize = 3072;

/// Detected type of a payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    /// MIME type, possibly with parameters (`text/plain; charset=utf-8`).
    pub mime: String,
    /// Canonical extension including the dot, when one is known.
    pub extension: Option<String>,
}

impl ContentType {
    pub fn new(mime: impl Into<String>, extension: Option<&str>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.map(str::to_string),
        }
    }

    pub fn octet_stream() -> Self {
        Self::new("application/octet-stream", None)
    }

    /// MIME type without parameters.
    pub fn essence(&self) -> &str {
        self.mime.split(';').next().unwrap_or_default().trim()
    }
}

/// Detects the content type of a payload.
pub trait ContentClassifier: Send + Sync {
    fn classify(&self, data: &[u8]) -> ContentType;
}

/// Magic-number classifier with a UTF-8 text fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct MagicClassifier;

struct Signature {
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
    extension: &'static str,
}

const fn sig(magic: &'static [u8], mime: &'static str, extension: &'static str) -> Signature {
    Signature {
        offset: 0,
        magic,
        mime,
        extension,
    }
}

const SIGNATURES: &[Signature] = &[
    // Packet captures, both byte orders.
    sig(&[0xd4, 0xc3, 0xb2, 0xa1], "application/vnd.tcpdump.pcap", ".pcap"),
    sig(&[0xa1, 0xb2, 0xc3, 0xd4], "application/vnd.tcpdump.pcap", ".pcap"),
    sig(&[0x0a, 0x0d, 0x0d, 0x0a], "application/x-pcapng", ".pcapng"),
    sig(&[0x1f, 0x8b], "application/gzip", ".gz"),
    sig(&[0x28, 0xb5, 0x2f, 0xfd], "application/zstd", ".zst"),
    sig(&[0xfd, b'7', b'z', b'X', b'Z', 0x00], "application/x-xz", ".xz"),
    sig(&[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c], "application/x-7z-compressed", ".7z"),
    sig(b"BZh", "application/x-bzip2", ".bz2"),
    sig(b"PK\x03\x04", "application/zip", ".zip"),
    sig(b"\x89PNG\r\n\x1a\n", "image/png", ".png"),
    sig(&[0xff, 0xd8, 0xff], "image/jpeg", ".jpg"),
    sig(b"GIF87a", "image/gif", ".gif"),
    sig(b"GIF89a", "image/gif", ".gif"),
    sig(b"%PDF-", "application/pdf", ".pdf"),
    sig(b"OggS", "application/ogg", ".ogg"),
    sig(b"ID3", "audio/mpeg", ".mp3"),
    sig(b"\x1aE\xdf\xa3", "video/webm", ".webm"),
    sig(b"!<arch>\ndebian", "application/vnd.debian.binary-package", ".deb"),
    Signature {
        offset: 8,
        magic: b"WEBP",
        mime: "image/webp",
        extension: ".webp",
    },
    Signature {
        offset: 4,
        magic: b"ftyp",
        mime: "video/mp4",
        extension: ".mp4",
    },
];

impl ContentClassifier for MagicClassifier {
    fn classify(&self, data: &[u8]) -> ContentType {
        for s in SIGNATURES {
            if data.get(s.offset..s.offset + s.magic.len()) == Some(s.magic) {
                return ContentType::new(s.mime, Some(s.extension));
            }
        }
        classify_text(data).unwrap_or_else(ContentType::octet_stream)
    }
}

fn classify_text(data: &[u8]) -> Option<ContentType> {
    let head = &data[..data.len().min(SNIFF_LEN)];
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // A multi-byte character cut by the prefix boundary is still text.
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&head[..e.valid_up_to()]).ok()?,
        Err(_) => return None,
    };
    if text
        .bytes()
        .any(|b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
    {
        return None;
    }

    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    let lower: String = trimmed.chars().take(64).collect::<String>().to_ascii_lowercase();

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && data.len() <= SNIFF_LEN
        && serde_json::from_slice::<serde_json::Value>(data).is_ok()
    {
        return Some(ContentType::new("application/json", Some(".json")));
    }
    if lower.starts_with("<?xml") {
        if trimmed.contains("<svg") {
            return Some(ContentType::new("image/svg+xml", Some(".svg")));
        }
        return Some(ContentType::new("text/xml; charset=utf-8", Some(".xml")));
    }
    if lower.starts_with("<svg") {
        return Some(ContentType::new("image/svg+xml", Some(".svg")));
    }
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some(ContentType::new("text/html; charset=utf-8", Some(".html")));
    }
    Some(ContentType::new("text/plain; charset=utf-8", Some(".txt")))
}
