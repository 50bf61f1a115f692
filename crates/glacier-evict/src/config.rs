use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing of the background loops. The usage threshold itself lives in
/// the store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Pause between eviction cycles.
    pub interval_secs: u64,
    /// Pause between disk usage samples.
    pub monitor_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            monitor_interval_secs: 1,
        }
    }
}

impl EvictionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }
}
