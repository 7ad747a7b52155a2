use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Mirror behaviour of a watched subtree
///
/// # Configuration Example
///
/// ```toml
/// [cache]
/// flush_interval_ms = 10000
/// event_buffer_size = 1024
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Period of the reconciliation sweep run by every subtree root
    ///
    /// Watches are one-shot and can be missed across reconnects; the sweep
    /// re-reads the whole subtree on this cadence regardless.
    ///
    /// **Default**: 10000
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Capacity of each subtree root's event channel
    ///
    /// Emission waits while the channel is full: a consumer that stops
    /// reading stalls event delivery for that whole subtree.
    ///
    /// **Default**: 1024
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "cache.flush_interval_ms must be greater than 0".into(),
            )));
        }

        if self.flush_interval_ms < 100 {
            warn!(
                "cache.flush_interval_ms ({}) is very small; every tick re-reads the whole subtree",
                self.flush_interval_ms
            );
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "cache.event_buffer_size must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

const fn default_flush_interval_ms() -> u64 {
    10_000
}

const fn default_event_buffer_size() -> usize {
    1024
}
