//! Backoff arithmetic for transient-failure retries.

use std::collections::BTreeSet;
use std::time::Duration;

/// Statuses retried when no explicit set is configured.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Bounded exponential backoff.
///
/// Attempt 0 is the first send. Before retry `k` (0-indexed) the executor
/// waits `base_delay * multiplier^k`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound on any single delay, including server hints.
    pub max_delay: Duration,
    /// HTTP statuses that count as transient.
    pub retryable_statuses: BTreeSet<u16>,
    /// Honor `Retry-After` on retryable responses.
    pub respect_retry_after: bool,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            respect_retry_after: true,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if `status` is in the retryable set.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Backoff before retry `retry_index`, without any server hint.
    #[must_use]
    pub fn backoff(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base_delay.as_secs_f64() * 1000.0 * factor;
        let max_millis = self.max_delay.as_secs_f64() * 1000.0;
        if !millis.is_finite() || millis >= max_millis {
            return self.max_delay;
        }
        Duration::from_secs_f64(millis.max(0.0) / 1000.0)
    }

    /// Delay before retry `retry_index`, lengthened by a `Retry-After` hint.
    #[must_use]
    pub fn delay_for(&self, retry_index: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(retry_index);
        match retry_after {
            Some(hint) if self.respect_retry_after => backoff.max(hint.min(self.max_delay)),
            _ => backoff,
        }
    }
}
