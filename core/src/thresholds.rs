use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::models::ThresholdConfig;

/// Freshness window for a loaded configuration.
pub const CONFIG_CACHE_TTL: Duration = Duration::from_secs(180);

struct CacheEntry {
    config: ThresholdConfig,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// Time-bound cache-aside holder for the singleton threshold configuration.
///
/// Concurrent callers may race on a miss and both load from the store; that
/// is benign: the loaded values are identical and the last write wins.
pub struct ThresholdCache {
    entry: Mutex<Option<CacheEntry>>,
    ttl: Duration,
}

impl Default for ThresholdCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(CONFIG_CACHE_TTL)
    }

    /// Cache with a custom TTL, used by tests to exercise expiry.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    /// Return the cached configuration if present and unexpired; otherwise
    /// call `load`, cache its result, and return it.
    pub fn get_or_load<F>(&self, load: F) -> Result<ThresholdConfig>
    where
        F: FnOnce() -> Result<ThresholdConfig>,
    {
        let mut guard = self
            .entry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = guard.as_ref() {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.config.clone());
            }
        }
        let config = load()?;
        *guard = Some(CacheEntry {
            config: config.clone(),
            fetched_at: Instant::now(),
        });
        Ok(config)
    }

    /// Forcibly evict the cached value; the next `get_or_load` reloads.
    pub fn invalidate(&self) {
        let mut guard = self
            .entry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }
}
