use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use glacier_types::IdCodec;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_DISK_USAGE_ALLOWED: u8 = 75;
pub const MIN_DISK_USAGE_ALLOWED: u8 = 5;
pub const MAX_DISK_USAGE_ALLOWED: u8 = 99;

/// Codec used for entries the compression policy selects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// gzip; readable by every existing container consumer.
    #[default]
    Gzip,
    Zstd,
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip => write!(f, "gzip"),
            Self::Zstd => write!(f, "zstd"),
        }
    }
}

impl FromStr for CompressionCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Self::Gzip),
            "zstd" | "zst" => Ok(Self::Zstd),
            other => Err(format!("unknown compression codec: {other}")),
        }
    }
}

/// Storage engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root of the container tree.
    pub data_folder: PathBuf,
    /// Disk usage percentage above which eviction starts (5-99).
    pub disk_usage_allowed: u8,
    /// Honour the retention-extension byte of time-encoded identifiers.
    pub extend_life_support: bool,
    /// Bound on every per-container lock wait.
    pub lock_timeout_ms: u64,
    pub codec: CompressionCodec,
    /// Use the content allow-list alone when deciding what to compress.
    pub strict_compression: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_folder: PathBuf::from("files"),
            disk_usage_allowed: DEFAULT_DISK_USAGE_ALLOWED,
            extend_life_support: false,
            lock_timeout_ms: 500,
            codec: CompressionCodec::default(),
            strict_compression: false,
        }
    }
}

impl StoreConfig {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        Self {
            data_folder: data_folder.into(),
            ..Self::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn id_codec(&self) -> IdCodec {
        IdCodec::new(self.extend_life_support)
    }

    /// Replace out-of-range values with their defaults.
    pub fn validated(mut self) -> Self {
        if !(MIN_DISK_USAGE_ALLOWED..=MAX_DISK_USAGE_ALLOWED).contains(&self.disk_usage_allowed) {
            warn!(
                value = self.disk_usage_allowed,
                default = DEFAULT_DISK_USAGE_ALLOWED,
                "disk_usage_allowed must be between {MIN_DISK_USAGE_ALLOWED} and {MAX_DISK_USAGE_ALLOWED}; using default"
            );
            self.disk_usage_allowed = DEFAULT_DISK_USAGE_ALLOWED;
        }
        if self.lock_timeout_ms == 0 {
            warn!("lock_timeout_ms must be positive; using 500");
            self.lock_timeout_ms = 500;
        }
        self
    }
}

/// Parse a disk-usage threshold from text (e.g. an environment variable),
/// falling back to the default on anything unparsable or out of range.
pub fn parse_disk_usage_allowed(raw: &str) -> u8 {
    match raw.trim().parse::<u8>() {
        Ok(v) if (MIN_DISK_USAGE_ALLOWED..=MAX_DISK_USAGE_ALLOWED).contains(&v) => v,
        _ => {
            warn!(
                raw,
                default = DEFAULT_DISK_USAGE_ALLOWED,
                "invalid disk usage threshold; using default"
            );
            DEFAULT_DISK_USAGE_ALLOWED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.data_folder, PathBuf::from("files"));
        assert_eq!(c.disk_usage_allowed, 75);
        assert!(!c.extend_life_support);
        assert_eq!(c.lock_timeout(), Duration::from_millis(500));
        assert_eq!(c.codec, CompressionCodec::Gzip);
        assert!(!c.strict_compression);
    }

    #[test]
    fn out_of_range_threshold_is_reset() {
        let c = StoreConfig {
            disk_usage_allowed: 100,
            ..StoreConfig::default()
        };
        assert_eq!(c.validated().disk_usage_allowed, 75);

        let c = StoreConfig {
            disk_usage_allowed: 4,
            ..StoreConfig::default()
        };
        assert_eq!(c.validated().disk_usage_allowed, 75);

        let c = StoreConfig {
            disk_usage_allowed: 90,
            ..StoreConfig::default()
        };
        assert_eq!(c.validated().disk_usage_allowed, 90);
    }

    #[test]
    fn threshold_parsing() {
        assert_eq!(parse_disk_usage_allowed("80"), 80);
        assert_eq!(parse_disk_usage_allowed(" 5 "), 5);
        assert_eq!(parse_disk_usage_allowed("99"), 99);
        assert_eq!(parse_disk_usage_allowed("100"), 75);
        assert_eq!(parse_disk_usage_allowed("lots"), 75);
        assert_eq!(parse_disk_usage_allowed(""), 75);
    }

    #[test]
    fn codec_parsing() {
        assert_eq!("gzip".parse::<CompressionCodec>().unwrap(), CompressionCodec::Gzip);
        assert_eq!("ZSTD".parse::<CompressionCodec>().unwrap(), CompressionCodec::Zstd);
        assert!("lz4".parse::<CompressionCodec>().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let c: StoreConfig = toml::from_str("codec = \"zstd\"\nextend_life_support = true").unwrap();
        assert_eq!(c.codec, CompressionCodec::Zstd);
        assert!(c.extend_life_support);
        assert_eq!(c.disk_usage_allowed, 75);
    }
}
