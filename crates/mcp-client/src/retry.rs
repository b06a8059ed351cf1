//! Connection retry policy with jittered exponential back-off.

use std::time::Duration;

use mcx_domain::config::GlobalSettings;

/// Controls how often and how far apart a server connection is attempted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self {
            initial_delay: settings.retry_backoff(),
            max_attempts: settings.retry_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt number `failures` (0-indexed).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(failures as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Up to 25% jitter so servers that failed together do not retry in lockstep.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(failures);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Deterministic fraction in [0, 1) derived from the attempt number.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_add(1).wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64)
}
