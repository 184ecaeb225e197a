//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Upper bound for any delay, before jitter.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Backoff without jitter.
    pub fn fixed(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = 2.0_f64.powi(attempt.min(62) as i32);
        let delay = (self.base.as_secs_f64() * exp).min(self.max.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let spread = if jitter > 0.0 {
            delay * jitter * rand::rng().random_range(-1.0..=1.0)
        } else {
            0.0
        };

        Duration::from_secs_f64((delay + spread).max(0.0))
    }
}
