//! Retry policy for stage handlers.
//!
//! The default policy sleeps a fixed interval between attempts. Linear and
//! exponential backoff, with optional jitter, are available for handlers that
//! talk to flaky remote systems.

use crate::errors::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = interval
    #[default]
    Constant,
    /// delay = interval * (retry + 1)
    Linear,
    /// delay = interval * 2^retry
    Exponential,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// How often and how patiently a stage re-invokes its handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. The handler runs at most
    /// `retry_count + 1` times.
    pub retry_count: u32,
    /// Base delay between attempts in milliseconds. Zero retries immediately.
    pub retry_interval_ms: u64,
    /// Upper bound for a single delay in milliseconds.
    pub max_interval_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 0,
            retry_interval_ms: 0,
            max_interval_ms: 30_000,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with no retries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fixed-interval policy.
    #[must_use]
    pub fn fixed(retry_count: u32, interval: Duration) -> Self {
        Self::new()
            .with_retry_count(retry_count)
            .with_interval(interval)
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the base interval. Raises the cap if it would be exceeded.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = duration_ms(interval);
        self.max_interval_ms = self.max_interval_ms.max(self.retry_interval_ms);
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_interval(mut self, max: Duration) -> Self {
        self.max_interval_ms = duration_ms(max);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total number of handler invocations allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u64 {
        u64::from(self.retry_count) + 1
    }

    /// Checks the policy for inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_interval_ms < self.retry_interval_ms {
            return Err(ConfigError::IntervalCap {
                base_ms: self.retry_interval_ms,
                max_ms: self.max_interval_ms,
            });
        }
        Ok(())
    }

    /// Delay to wait after the failed attempt numbered `retry` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.retry_interval_ms;
        let max = self.max_interval_ms.max(base);

        let delay = match self.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policy_has_no_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_count, 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
    }

    #[test]
    fn test_linear_and_exponential_backoff() {
        let linear = RetryPolicy::fixed(5, Duration::from_millis(100))
            .with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(0), Duration::from_millis(100));
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let exponential = RetryPolicy::fixed(5, Duration::from_millis(100))
            .with_backoff(BackoffStrategy::Exponential);
        assert_eq!(exponential.delay_for(0), Duration::from_millis(100));
        assert_eq!(exponential.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::fixed(20, Duration::from_secs(1))
            .with_backoff(BackoffStrategy::Exponential)
            .with_max_interval(Duration::from_secs(5));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let policy = RetryPolicy::fixed(1, Duration::from_millis(100))
            .with_jitter(JitterStrategy::Full);
        for _ in 0..20 {
            assert!(policy.delay_for(0) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_validate_rejects_cap_below_interval() {
        let mut policy = RetryPolicy::fixed(1, Duration::from_millis(500));
        policy.max_interval_ms = 100;
        assert_eq!(
            policy.validate(),
            Err(ConfigError::IntervalCap { base_ms: 500, max_ms: 100 })
        );
    }

    #[test]
    fn test_deserialize_partial_policy() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"retry_count": 2, "retry_interval_ms": 10, "backoff": "linear"}"#)
                .expect("valid policy");
        assert_eq!(policy.retry_count, 2);
        assert_eq!(policy.backoff, BackoffStrategy::Linear);
        assert_eq!(policy.jitter, JitterStrategy::None);
    }
}
