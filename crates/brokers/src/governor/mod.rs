//! Request Governor: pacing, caching, and bounded retry for outbound calls.
//!
//! Every adapter call goes through one shared governor instance so that all
//! adapters of a platform draw from the same rate budget. The governor is an
//! explicitly constructed, injected service; it owns no global state.

mod cache;
mod rate_limiter;

pub use cache::{ResponseCache, DEFAULT_CACHE_TTL};
pub use rate_limiter::{PacingConfig, RateLimiter};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::{BrokerError, RetryClass};
use crate::models::Platform;
use crate::transport::{HttpMethod, HttpTransport, TransportError, TransportRequest, TransportResponse};

/// Maximum attempts per governed call (initial try plus retries).
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Governor construction parameters.
#[derive(Clone, Debug)]
pub struct GovernorConfig {
    /// Attempt budget for transient failures.
    pub max_attempts: u32,
    /// Time-to-live for cached idempotent responses.
    pub cache_ttl: Duration,
    /// Backoff unit; the delay before attempt `n + 1` is `base * 2^n`.
    /// One second yields the standard 2^attempt-seconds schedule.
    pub backoff_base: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_ttl: DEFAULT_CACHE_TTL,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Caching behavior for a governed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    /// Never cached (mutating or auth calls).
    Skip,
    /// Cached by (platform, URL); served from cache when fresh.
    Use,
    /// Cached, but this call must hit the provider (force refresh).
    Refresh,
}

/// Shared wrapper around every outbound provider call.
pub struct RequestGovernor {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: RateLimiter,
    cache: ResponseCache,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RequestGovernor {
    pub fn new(transport: Arc<dyn HttpTransport>, config: GovernorConfig) -> Self {
        Self {
            transport,
            rate_limiter: RateLimiter::new(),
            cache: ResponseCache::new(config.cache_ttl),
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
        }
    }

    /// Overrides pacing for a platform.
    pub fn configure_pacing(&self, platform: Platform, config: PacingConfig) {
        self.rate_limiter.configure(platform, config);
    }

    /// Executes a call under pacing and bounded retry, consulting the
    /// response cache according to `cache_mode`.
    ///
    /// Responses with non-2xx statuses other than the transient set
    /// (429/502/503/504) are returned as-is: provider-specific rejection
    /// codes are for the adapter to interpret, and hard rejects must not
    /// be retried here.
    pub async fn execute(
        &self,
        platform: Platform,
        request: TransportRequest,
        cache_mode: CacheMode,
    ) -> Result<TransportResponse, BrokerError> {
        let cacheable = request.method == HttpMethod::Get && cache_mode != CacheMode::Skip;

        if cacheable && cache_mode == CacheMode::Use {
            if let Some(hit) = self.cache.get(platform, &request.url) {
                return Ok(hit);
            }
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.rate_limiter.acquire(platform).await;

            debug!(
                "Governor: {} attempt {}/{} -> {}",
                platform, attempt, self.max_attempts, request.url
            );

            let error = match self.transport.send(request.clone()).await {
                Ok(response) if response.status == 429 => BrokerError::RateLimited { platform },
                Ok(response) if matches!(response.status, 502 | 503 | 504) => {
                    BrokerError::ProviderUnavailable {
                        platform,
                        status: response.status,
                    }
                }
                Ok(response) => {
                    if cacheable {
                        self.cache.put(platform, &request.url, &response);
                    }
                    return Ok(response);
                }
                Err(TransportError::Timeout) => BrokerError::Timeout { platform },
                Err(TransportError::Network(message)) => {
                    BrokerError::Network { platform, message }
                }
            };

            if attempt >= self.max_attempts || error.retry_class() != RetryClass::WithBackoff {
                return Err(error);
            }

            let delay = self.backoff_base * 2u32.saturating_pow(attempt);
            warn!(
                "Governor: transient failure from {} ({}), retrying in {:?}",
                platform, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drops cached responses for a platform (token rotation, forced resync).
    pub fn invalidate_cache(&self, platform: Platform) {
        self.cache.invalidate_platform(platform);
    }
}
