use crate::classify::ContentType;

/// Payloads at or below this size are always stored raw.
pub const MIN_COMPRESS_SIZE: usize = 100;

/// Payloads strictly between [`MIN_COMPRESS_SIZE`] and this size are
/// compressed regardless of type unless the policy is strict.
pub const FORCE_COMPRESS_LIMIT: usize = 20_000_000;

/// Extensions and MIME types worth compressing.
pub const COMPRESSIBLE: &[&str] = &[
    ".txt", ".html", "text/csv", "text/plain", "text/html", ".svg", ".xml", ".php", ".js", ".lua",
    ".pl", ".py", ".json", ".geojson", ".har", ".ndjson", ".rtf", ".tcl", ".csv", ".tsv", ".vcf",
    ".ics",
];

/// Formats that are already compressed.
pub const INCOMPRESSIBLE: &[&str] = &[
    ".xz", ".gz", ".7z", ".zip", ".bz2", ".zst", ".ogg", ".ogv", ".png", ".jpg", ".jp2", ".jpf",
    ".jpm", ".webp", ".tiff", ".mp3", ".amr", ".aac", ".mp4", ".m4a", ".m4v", ".webm", ".mpeg",
    ".mov", ".mqv", ".3gp", ".3g2", ".avi", ".flv", ".mkv", ".asf", ".deb",
];

/// Decides whether a payload is stored compressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressionPolicy {
    strict: bool,
}

impl CompressionPolicy {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn should_compress(&self, len: usize, content_type: &ContentType) -> bool {
        if len <= MIN_COMPRESS_SIZE {
            return false;
        }
        if self.strict {
            return !listed(INCOMPRESSIBLE, content_type) && listed(COMPRESSIBLE, content_type);
        }
        listed(COMPRESSIBLE, content_type) || len < FORCE_COMPRESS_LIMIT
    }
}

fn listed(list: &[&str], content_type: &ContentType) -> bool {
    let essence = content_type.essence();
    list.iter().any(|item| {
        *item == essence || content_type.extension.as_deref() == Some(*item)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text() -> ContentType {
        ContentType::new("text/plain; charset=utf-8", Some(".txt"))
    }

    fn png() -> ContentType {
        ContentType::new("image/png", Some(".png"))
    }

    fn binary() -> ContentType {
        ContentType::octet_stream()
    }

    #[test]
    fn small_payloads_never_compress() {
        let policy = CompressionPolicy::default();
        assert!(!policy.should_compress(1, &text()));
        assert!(!policy.should_compress(100, &text()));
        assert!(!CompressionPolicy::new(true).should_compress(100, &text()));
    }

    #[test]
    fn mid_sized_payloads_always_compress() {
        let policy = CompressionPolicy::default();
        assert!(policy.should_compress(101, &binary()));
        assert!(policy.should_compress(101, &png()));
        assert!(policy.should_compress(FORCE_COMPRESS_LIMIT - 1, &png()));
    }

    #[test]
    fn large_payloads_follow_allow_list() {
        let policy = CompressionPolicy::default();
        assert!(!policy.should_compress(FORCE_COMPRESS_LIMIT, &binary()));
        assert!(!policy.should_compress(FORCE_COMPRESS_LIMIT + 1, &png()));
        assert!(policy.should_compress(FORCE_COMPRESS_LIMIT, &text()));
        assert!(policy.should_compress(
            FORCE_COMPRESS_LIMIT + 1,
            &ContentType::new("text/csv", None)
        ));
    }

    #[test]
    fn strict_mode_uses_lists_only() {
        let policy = CompressionPolicy::new(true);
        assert!(policy.is_strict());
        assert!(policy.should_compress(101, &text()));
        assert!(!policy.should_compress(101, &binary()));
        assert!(!policy.should_compress(5_000, &png()));
        assert!(policy.should_compress(
            FORCE_COMPRESS_LIMIT * 2,
            &ContentType::new("application/json", Some(".json"))
        ));
    }

    #[test]
    fn lists_do_not_overlap() {
        for item in COMPRESSIBLE {
            assert!(!INCOMPRESSIBLE.contains(item), "{item} in both lists");
        }
    }
}
