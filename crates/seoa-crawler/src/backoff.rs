use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;
use crate::error::FetchError;

/// Exponential backoff with optional "equal jitter".
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, factor: f64, jitter: bool) -> Self {
        Self {
            base,
            max,
            factor: factor.max(1.0),
            jitter,
        }
    }

    /// Upper bound of the delay before retry number `attempt` (0-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.base.as_millis() as f64 * exp;
        if !millis.is_finite() || millis >= self.max.as_millis() as f64 {
            self.max
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Delay before retry number `attempt`, drawn from `[ceiling / 2, ceiling]`
    /// when jitter is enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let high = ceiling.as_millis() as u64;
        let low = high / 2;
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Delay before retrying after `err`, a server supplied `Retry-After`
    /// wins over the computed value but is still capped.
    pub fn delay_for(&self, attempt: u32, err: &FetchError) -> Duration {
        match err.retry_after() {
            Some(wait) => wait.min(self.max),
            None => self.delay(attempt),
        }
    }
}

impl From<BackoffConfig> for Backoff {
    fn from(c: BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(c.base_ms),
            Duration::from_millis(c.max_ms),
            c.factor,
            c.jitter,
        )
    }
}

impl Default for Backoff {
    fn default() -> Self {
        BackoffConfig::default().into()
    }
}
