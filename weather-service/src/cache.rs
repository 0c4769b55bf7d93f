use chrono::{DateTime, Duration, Utc};
use common::models::{CacheEntryStats, CacheStats, ForecastSnapshot, WeatherSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Stored payload. Forecast entries always hold the full forecast window.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedWeather {
    Current(WeatherSnapshot),
    Forecast(ForecastSnapshot),
}

struct CacheEntry {
    data: CachedWeather,
    expires_at: DateTime<Utc>,
}

/// In-process TTL cache keyed by normalized query.
///
/// Entries are never mutated; a refresh replaces the entry under the same
/// key. Expiry is checked lazily on lookup, there is no sweeper.
pub struct WeatherCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl WeatherCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Fresh value for `key`, if any. A stale entry found here is evicted.
    pub async fn get(&self, key: &str) -> Option<CachedWeather> {
        let now = self.clock.now();
        {
            let cache = self.cache.read().await;
            match cache.get(key) {
                Some(entry) if now < entry.expires_at => {
                    debug!(key = %key, "Cache hit");
                    return Some(entry.data.clone());
                }
                Some(_) => {}
                None => {
                    debug!(key = %key, "Cache miss");
                    return None;
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another writer may have refreshed the key between the two locks.
        if cache
            .get(key)
            .is_some_and(|entry| self.clock.now() >= entry.expires_at)
        {
            cache.remove(key);
            info!(key = %key, "Cache entry expired");
        }
        None
    }

    pub async fn set(&self, key: String, data: CachedWeather, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(ttl).unwrap_or_else(|| {
            warn!(key = %key, ttl_ms = ttl.num_milliseconds(), "TTL out of range, entry never expires");
            DateTime::<Utc>::MAX_UTC
        });
        info!(key = %key, ttl_ms = ttl.num_milliseconds(), "Cached");
        self.cache
            .write()
            .await
            .insert(key, CacheEntry { data, expires_at });
    }

    /// Remove every entry and return how many there were.
    pub async fn clear(&self) -> usize {
        let mut cache = self.cache.write().await;
        let removed = cache.len();
        cache.clear();
        info!(removed, "Cache cleared");
        removed
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    #[cfg(test)]
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of all stored entries, sorted by key. Entries that expired
    /// but were not looked up since are included and flagged.
    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let cache = self.cache.read().await;

        let mut entries: Vec<CacheEntryStats> = cache
            .iter()
            .map(|(key, entry)| {
                let remaining = entry.expires_at - now;
                CacheEntryStats {
                    key: key.clone(),
                    expires_at: entry.expires_at,
                    ttl_ms: remaining.num_milliseconds(),
                    expired: remaining <= Duration::zero(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            total_entries: entries.len(),
            entries,
        }
    }
}
