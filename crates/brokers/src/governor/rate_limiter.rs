//! Token bucket rate limiter with a minimum inter-call gap.
//!
//! Pacing state is keyed by platform and shared by every adapter instance
//! of that platform, so concurrent syncs draw from the same budget.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::Platform;

/// Default rate limit: 60 requests per rolling minute.
const DEFAULT_REQUESTS_PER_MINUTE: f64 = 60.0;

/// Default bucket capacity (allows bursting).
const DEFAULT_BUCKET_CAPACITY: f64 = 5.0;

/// Default minimum gap between consecutive calls to the same platform.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Pacing configuration for a platform.
#[derive(Clone, Debug)]
pub struct PacingConfig {
    /// Maximum requests per rolling minute.
    pub requests_per_minute: u32,
    /// Maximum burst capacity.
    pub burst_capacity: f64,
    /// Minimum fixed gap between consecutive calls.
    pub min_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE as u32,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// Token bucket plus last-call tracking for a single platform.
#[derive(Debug)]
struct PlatformPacer {
    tokens: f64,
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    capacity: f64,
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl PlatformPacer {
    fn new(config: &PacingConfig) -> Self {
        Self {
            tokens: config.burst_capacity,
            last_update: Instant::now(),
            rate: config.requests_per_minute as f64 / 60.0,
            capacity: config.burst_capacity,
            min_interval: config.min_interval,
            last_call: None,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Remaining wait before the minimum inter-call gap is satisfied.
    fn gap_wait(&self) -> Duration {
        match self.last_call {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Tries to take a token and claim the call slot.
    /// Returns the wait required before retrying when pacing blocks the call.
    fn try_claim(&mut self) -> Result<(), Duration> {
        self.refill();

        let gap = self.gap_wait();
        if gap > Duration::ZERO {
            return Err(gap);
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.last_call = Some(Instant::now());
            return Ok(());
        }

        let tokens_needed = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(tokens_needed / self.rate))
    }
}

/// Per-platform rate limiter.
///
/// Thread-safe; pacers are created on demand with default settings or from
/// a configured override.
pub struct RateLimiter {
    pacers: Mutex<HashMap<Platform, PlatformPacer>>,
    configs: Mutex<HashMap<Platform, PacingConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            pacers: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the pacers mutex, recovering from poison if necessary.
    ///
    /// The worst case of recovering is slightly off pacing, which beats
    /// panicking inside every outbound call.
    fn lock_pacers(&self) -> MutexGuard<'_, HashMap<Platform, PlatformPacer>> {
        self.pacers.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter pacers mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<Platform, PacingConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure pacing for a platform. Resets any existing pacer.
    pub fn configure(&self, platform: Platform, config: PacingConfig) {
        let mut configs = self.lock_configs();
        configs.insert(platform, config);
        drop(configs);

        let mut pacers = self.lock_pacers();
        pacers.remove(&platform);
    }

    /// Waits until a call to the platform is allowed, then claims the slot.
    pub async fn acquire(&self, platform: Platform) {
        loop {
            let wait = {
                let mut pacers = self.lock_pacers();
                let pacer = pacers
                    .entry(platform)
                    .or_insert_with(|| PlatformPacer::new(&self.config_for(platform)));

                match pacer.try_claim() {
                    Ok(()) => {
                        debug!("Rate limiter: claimed call slot for {}", platform);
                        return;
                    }
                    Err(wait) => wait,
                }
            };

            debug!("Rate limiter: waiting {:?} for {}", wait, platform);
            tokio::time::sleep(wait).await;
        }
    }

    fn config_for(&self, platform: Platform) -> PacingConfig {
        self.lock_configs()
            .get(&platform)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(min_interval_ms: u64) -> PacingConfig {
        PacingConfig {
            requests_per_minute: 60_000,
            burst_capacity: 1_000.0,
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    #[tokio::test]
    async fn consecutive_calls_respect_the_minimum_gap() {
        let limiter = RateLimiter::new();
        limiter.configure(Platform::AngelOne, fast_config(20));

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(Platform::AngelOne).await;
        }

        // Three calls -> two enforced gaps.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn platforms_pace_independently() {
        let limiter = RateLimiter::new();
        limiter.configure(Platform::AngelOne, fast_config(200));
        limiter.configure(Platform::Dhan, fast_config(0));

        limiter.acquire(Platform::AngelOne).await;

        // Dhan is not blocked by AngelOne's gap.
        let start = Instant::now();
        limiter.acquire(Platform::Dhan).await;
        limiter.acquire(Platform::Dhan).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn bucket_blocks_after_burst_capacity() {
        let limiter = RateLimiter::new();
        limiter.configure(
            Platform::Fyers,
            PacingConfig {
                requests_per_minute: 6_000, // 100/second for a fast test
                burst_capacity: 2.0,
                min_interval: Duration::ZERO,
            },
        );

        limiter.acquire(Platform::Fyers).await;
        limiter.acquire(Platform::Fyers).await;

        let start = Instant::now();
        limiter.acquire(Platform::Fyers).await;
        assert!(start.elapsed().as_millis() >= 5);
    }
}
