//! # Receive Backoff
//!
//! Exponential backoff applied by a listener between consecutive failed
//! receive calls, so an unreachable transport is not hammered in a tight loop.
//!
//! Jitter spreads out listeners that started failing at the same moment.

use rand::Rng;
use std::time::Duration;

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

/// Backoff policy for receive failures
///
/// # Examples
///
/// ```rust
/// use queue_listener_core::BackoffPolicy;
/// use std::time::Duration;
///
/// // Default policy: 1s initial, 30s max, 2.0x multiplier, ±25% jitter
/// let policy = BackoffPolicy::default();
///
/// // Custom policy
/// let policy = BackoffPolicy::new(Duration::from_millis(200), Duration::from_secs(5), 1.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Growth factor per consecutive failure
    pub backoff_multiplier: f64,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_percent: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the default ±25% jitter
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter_percent = 0.0;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the given number of consecutive failures
    ///
    /// `initial * multiplier^(failures - 1)`, capped at `max_delay`, then
    /// jittered. Zero failures means no delay.
    ///
    /// ```rust
    /// use queue_listener_core::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(8), 2.0)
    ///     .without_jitter();
    ///
    /// assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
    /// assert_eq!(policy.calculate_delay(3), Duration::from_secs(4));
    /// assert_eq!(policy.calculate_delay(10), Duration::from_secs(8));
    /// ```
    pub fn calculate_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(consecutive_failures - 1).unwrap_or(i32::MAX);
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // powi overflows to infinity for long failure streaks
        let capped_delay_secs = if base_delay_secs.is_finite() {
            base_delay_secs.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };

        let final_delay_secs = if self.jitter_percent > 0.0 {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs)
    }

    /// Apply random variation in `[delay * (1 - jitter), delay * (1 + jitter)]`
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

/// Consecutive-failure tracker owned by one listener
#[derive(Debug, Clone, Default)]
pub struct BackoffState {
    consecutive_failures: u32,
}

impl BackoffState {
    /// Start with no recorded failures
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn record_failure(&mut self, policy: &BackoffPolicy) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        policy.calculate_delay(self.consecutive_failures)
    }

    /// Clear the failure streak after a successful call
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Failures recorded since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
