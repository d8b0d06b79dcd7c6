//! Rate-limit retry with exponential backoff.
//!
//! Only `FetchError::RateLimited` is retried. Network and upstream failures
//! return immediately.

use std::time::Duration;

use crate::error::{FetchError, WeatherError};
use crate::provider::WeatherFetcher;
use crate::types::{Location, WeatherResponse};

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt)
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff before retry `attempt`, raised to the provider's
    /// `Retry-After` hint when that is longer. Still capped at `max_delay`.
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match retry_after {
            Some(hint) if hint > delay => hint.min(self.max_delay),
            _ => delay,
        }
    }
}

/// Fetch with bounded retries on rate limiting.
///
/// Makes at most `max_retries + 1` attempts. The attempt counter is local
/// to this call.
pub async fn fetch_with_retry<F>(
    fetcher: &F,
    location: &Location,
    policy: &RetryPolicy,
) -> Result<WeatherResponse, WeatherError>
where
    F: WeatherFetcher,
{
    let mut attempt: u32 = 0;

    loop {
        match fetcher.fetch(location).await {
            Ok(response) => {
                if attempt > 0 {
                    tracing::info!(
                        "Weather for {} fetched after {} retries",
                        location.label(),
                        attempt
                    );
                }
                return Ok(response);
            }
            Err(FetchError::RateLimited { retry_after }) if attempt < policy.max_retries => {
                let delay = policy.backoff(attempt, retry_after);
                tracing::debug!(
                    "Rate limited fetching {}, retry {} of {} in {:?}",
                    location.label(),
                    attempt + 1,
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e @ FetchError::RateLimited { .. }) => {
                // Expected under multi-location load; keep it quiet
                tracing::info!(
                    "Rate limit retries exhausted for {} after {} attempts",
                    location.label(),
                    attempt + 1
                );
                return Err(WeatherError::from_attempt(e, attempt + 1));
            }
            Err(e) => {
                tracing::warn!("Weather fetch for {} failed: {}", location.label(), e);
                return Err(WeatherError::from_attempt(e, attempt + 1));
            }
        }
    }
}
