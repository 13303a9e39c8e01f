//! Retry budget for transient provider failures.
//!
//! The budget is fixed per backend and never exposed to callers.

use std::time::Duration;

/// Upper bound on a server-requested `retry-after` we are willing to honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Exponential backoff with subtractive jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Up to this fraction of the delay is randomly removed.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-indexed), before jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32 << retry.min(16))
            .min(self.max_delay)
    }

    /// Delay before retry number `retry`, honoring a server hint when present.
    pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after
            && hint <= MAX_RETRY_AFTER
        {
            return hint;
        }
        let base = self.base_delay(retry);
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let jitter = rand::random::<f64>() * self.jitter_factor;
        base.mul_f64(1.0 - jitter)
    }
}

/// Parse a numeric `retry-after` header (seconds).
pub fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
