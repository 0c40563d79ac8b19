//! Retry policy: decides backoff delays.

use std::time::Duration;

use chrono::TimeDelta;

/// Exponential backoff for retriable handler failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: Duration::from_secs(3600),
        }
    }

    /// 2s base, doubling, capped at one hour.
    pub fn default_v1() -> Self {
        Self::new(Duration::from_secs(2), 2.0)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next attempt, given how many attempts were already made
    /// (1-indexed): `base_delay * multiplier^(attempts - 1)`, capped.
    ///
    /// With base_delay=2s, multiplier=2.0:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> TimeDelta {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let delay_ms = (base_ms * self.multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64() * 1000.0)
            .max(0.0);
        TimeDelta::milliseconds(delay_ms as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default_v1();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[rstest]
    #[case(0, 2)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(5, 32)]
    fn exponential_backoff_increases(#[case] attempts: u32, #[case] secs: i64) {
        let policy = RetryPolicy::default_v1();
        assert_eq!(policy.next_delay(attempts), TimeDelta::seconds(secs));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default_v1().with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.next_delay(30), TimeDelta::seconds(10));
        assert_eq!(policy.next_delay(u32::MAX), TimeDelta::seconds(10));
    }
}
