// src/pipeline/retry.rs

//! Jittered exponential backoff between fetch attempts.

use std::time::Duration;

use rand::Rng;

use crate::models::SchedulerConfig;

/// Backoff schedule: `base * 2^(n-1)` capped at `max`, with a random
/// fraction of each delay shaved off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Fraction in [0, 1] of the delay that is randomized
    pub jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.jitter,
        )
    }

    /// Delay before retry number `retry` (1 = first retry), without jitter.
    pub fn ceiling(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }

    /// Jittered delay before retry number `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        if self.jitter == 0.0 || ceiling.is_zero() {
            return ceiling;
        }
        let shaved = rand::thread_rng().gen_range(0.0..=self.jitter);
        ceiling.mul_f64(1.0 - shaved)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3), 0.0);
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(2), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(3), Duration::from_millis(2_000));
        assert_eq!(backoff.delay(4), Duration::from_secs(3));
        assert_eq!(backoff.delay(40), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_secs(10), 0.5);
        for retry in 1..5 {
            let ceiling = backoff.ceiling(retry);
            for _ in 0..100 {
                let d = backoff.delay(retry);
                assert!(d <= ceiling);
                assert!(d >= ceiling / 2);
            }
        }
    }

    #[test]
    fn zero_base_never_sleeps() {
        let backoff = Backoff::new(Duration::ZERO, Duration::from_secs(1), 0.5);
        assert!(backoff.delay(3).is_zero());
    }
}
