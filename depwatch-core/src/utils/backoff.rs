//! Retry delay policies for the watcher's error-backoff state.

use std::time::Duration;

/// Highest exponent used by [`ExponentialBackoff`] (2^11 = 2048 times the base).
const MAX_EXPONENT: u32 = 11;

/// Computes how long to wait before retrying after `attempt` consecutive
/// failures (`attempt` starts at 0 for the first failure).
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Always waits the same amount of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Doubles the delay per attempt: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.pow(attempt.min(MAX_EXPONENT));
        self.base.saturating_mul(factor).min(self.max)
    }
}
