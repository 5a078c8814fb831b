//! # Retry Logic and Backoff Strategies
//!
//! Computes how long a failed mutation waits before its next attempt.
//!
//! ## Features
//!
//! - **Exponential Backoff**: `min(max_delay, base_delay * 2^attempt)`
//! - **Jitter**: Randomness on top of the exponential delay, capped so the
//!   result never exceeds `max_delay`
//!
//! ## Usage
//!
//! ```rust
//! use claimsync::client::offline::retry::BackoffStrategy;
//! use std::time::Duration;
//!
//! let backoff = BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(300), 0.0);
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(3), Duration::from_secs(8));
//! assert_eq!(backoff.delay(20), Duration::from_secs(300));
//! ```

use crate::shared::config::SyncConfig;
use std::time::Duration;

/// Exponential backoff with capped jitter
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    /// Delay before the first retry
    base: Duration,
    /// Delay ceiling, jitter included
    max: Duration,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl BackoffStrategy {
    pub fn exponential(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::exponential(config.base_delay, config.max_delay, config.jitter)
    }

    /// Delay before retry number `attempt + 1` (attempt 0 is the first retry)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, rand::random::<f64>())
    }

    /// Deterministic variant of [`delay`](Self::delay); `sample` is in `[0, 1)`
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let delay = self.floor(attempt);
        let jitter_amount = delay.mul_f64(self.jitter * sample.clamp(0.0, 1.0));
        (delay + jitter_amount).min(self.max)
    }

    /// Delay range `[floor, ceiling]` that `delay(attempt)` falls into
    pub fn bounds(&self, attempt: u32) -> (Duration, Duration) {
        let floor = self.floor(attempt);
        let ceiling = (floor + floor.mul_f64(self.jitter)).min(self.max);
        (floor, ceiling)
    }

    fn floor(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(300), 0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(300), 0.0);

        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(4), Duration::from_secs(16));
        assert_eq!(backoff.delay(9), Duration::from_secs(300));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_is_capped_at_max() {
        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(10), 1.0);

        assert_eq!(backoff.delay_with_sample(2, 0.5), Duration::from_secs(6));
        assert_eq!(backoff.delay_with_sample(3, 0.99), Duration::from_secs(10));
        assert_eq!(backoff.delay_with_sample(6, 0.99), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_factor_is_clamped() {
        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(60), 4.0);
        assert_eq!(backoff.bounds(1), (Duration::from_secs(2), Duration::from_secs(4)));

        let backoff = BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(60), -1.0);
        assert_eq!(backoff.bounds(1), (Duration::from_secs(2), Duration::from_secs(2)));
    }

    #[test]
    fn test_from_config() {
        let config = SyncConfig::default();
        let backoff = BackoffStrategy::from_config(&config);
        let (floor, ceiling) = backoff.bounds(0);
        assert_eq!(floor, config.base_delay);
        assert!(ceiling <= config.max_delay);
    }
}
