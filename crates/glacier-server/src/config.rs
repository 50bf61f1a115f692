use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use glacier_evict::EvictionConfig;
use glacier_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Largest accepted request body by default (1 GiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 1 << 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_size: usize,
    /// Required on downloads when set.
    pub read_token: Option<String>,
    /// Required on uploads when set.
    pub write_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            read_token: None,
            write_token: None,
        }
    }
}

/// Whole-process configuration, as found in `glacier.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlacierConfig {
    pub store: StoreConfig,
    pub eviction: EvictionConfig,
    pub server: ServerConfig,
}

impl GlacierConfig {
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validated(mut self) -> Self {
        self.store = self.store.validated();
        self
    }
}
