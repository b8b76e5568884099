//! Response cache for idempotent provider calls.
//!
//! GET-equivalent calls are cached by (platform, URL) with a fixed
//! time-to-live so that repeated probes within one sync batch, or
//! overlapping batches, do not burn the provider's rate budget.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::Platform;
use crate::transport::TransportResponse;

/// Default time-to-live for cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    platform: Platform,
    url: String,
}

struct CacheEntry {
    stored_at: Instant,
    response: TransportResponse,
}

/// TTL cache keyed by (platform, canonical URL). Entries expire lazily.
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Response cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns the cached response for the key, if present and fresh.
    pub fn get(&self, platform: Platform, url: &str) -> Option<TransportResponse> {
        let key = CacheKey {
            platform,
            url: url.to_string(),
        };

        let mut entries = self.lock_entries();
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                debug!("Response cache hit for {} {}", platform, url);
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Stores a response. Only successful responses are worth keeping.
    pub fn put(&self, platform: Platform, url: &str, response: &TransportResponse) {
        if !response.is_success() {
            return;
        }

        let key = CacheKey {
            platform,
            url: url.to_string(),
        };
        self.lock_entries().insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                response: response.clone(),
            },
        );
    }

    /// Drops every cached entry for a platform.
    pub fn invalidate_platform(&self, platform: Platform) {
        self.lock_entries().retain(|key, _| key.platform != platform);
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
