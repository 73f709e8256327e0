//! # Event Log Configuration
//!
//! Engine-level settings: read limits, the delete-event safety threshold and
//! the retry policy of the transaction coordinator.
//!
//! ```text
//! Attempt    Delay (base=10ms, max=1s)    With jitter (±20%)
//! ──────────────────────────────────────────────────────────
//!    1            10ms                      8ms - 12ms
//!    2            20ms                     16ms - 24ms
//!    3            40ms                     32ms - 48ms
//!   ...
//!    8          1000ms (capped)           800ms - 1200ms
//!  >max       RetriesExhausted
//! ```

use crate::options::DEFAULT_MAX_COUNT;
use rand::Rng;
use std::time::Duration;

/// Default maximum number of rows `delete_event` may renumber without force.
pub const DEFAULT_MAX_RECORDS_TO_LOCK: i64 = 1000;

const DEFAULT_MAX_ATTEMPTS: u32 = 20;
const DEFAULT_BASE_DELAY_MS: u64 = 10;
const DEFAULT_MAX_DELAY_MS: u64 = 1000;
const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Bounded exponential backoff for conflicting transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of any single delay.
    pub max_delay: Duration,
    /// Jitter factor in `0.0..=1.0`.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, without sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the retry following attempt number `attempt` (1-based),
    /// without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }

    /// Delay before the retry following attempt number `attempt`, with jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let jitter = self.jitter_factor.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor)
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("EVENTLOG_RETRY_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            base_delay: env_parse("EVENTLOG_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: env_parse("EVENTLOG_RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            jitter_factor: defaults.jitter_factor,
        }
    }
}

/// Configuration of the event log engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogConfig {
    /// Limit applied to reads that do not set one.
    pub max_count: i64,
    /// Rows `delete_event` may renumber before it requires force.
    pub max_records_to_lock: i64,
    /// Retry policy of the transaction coordinator.
    pub retry: RetryPolicy,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            max_records_to_lock: DEFAULT_MAX_RECORDS_TO_LOCK,
            retry: RetryPolicy::default(),
        }
    }
}

impl EventLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from `EVENTLOG_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_count: env_parse("EVENTLOG_MAX_COUNT").unwrap_or(defaults.max_count),
            max_records_to_lock: env_parse("EVENTLOG_MAX_RECORDS_TO_LOCK")
                .unwrap_or(defaults.max_records_to_lock),
            retry: RetryPolicy::from_env(),
        }
    }

    pub fn with_max_count(mut self, max_count: i64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_max_records_to_lock(mut self, max_records_to_lock: i64) -> Self {
        self.max_records_to_lock = max_records_to_lock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EventLogConfig::default();
        assert_eq!(config.max_count, 1000);
        assert_eq!(config.max_records_to_lock, 1000);
        assert_eq!(config.retry.max_attempts, 20);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.base_delay_for(4), Duration::from_millis(80));
        assert_eq!(policy.base_delay_for(30), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(3);
            assert!(delay >= Duration::from_millis(31));
            assert!(delay <= Duration::from_millis(49));
        }
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.can_retry(1));
        assert!(policy.can_retry(2));
        assert!(!policy.can_retry(3));
        assert_eq!(policy.delay_for(2), Duration::ZERO);
    }
}
