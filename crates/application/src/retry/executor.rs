//! Exponential-backoff executor.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tollgate_domain::{ClientError, ErrorKind, ResponseSpec, RetryPolicy, TokenGrant};
use tracing::debug;

use crate::ports::ProviderError;

/// What to do with an attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the outcome back to the caller.
    Stop,
    /// Try again, optionally no sooner than the server asked.
    Retry {
        /// `Retry-After` hint from the server.
        after: Option<Duration>,
    },
}

/// Decides whether an outcome is worth another attempt.
pub trait Classify {
    /// Classifies `self` under `policy`.
    fn classify(&self, policy: &RetryPolicy) -> Verdict;
}

impl Classify for Result<ResponseSpec, ClientError> {
    fn classify(&self, policy: &RetryPolicy) -> Verdict {
        match self {
            Ok(response) if policy.is_retryable_status(response.status.as_u16()) => {
                Verdict::Retry {
                    after: response.retry_after(),
                }
            }
            Err(error) if matches!(error.kind, ErrorKind::Network | ErrorKind::Timeout) => {
                Verdict::Retry { after: None }
            }
            _ => Verdict::Stop,
        }
    }
}

impl Classify for Result<TokenGrant, ProviderError> {
    fn classify(&self, _policy: &RetryPolicy) -> Verdict {
        match self {
            Err(error) if error.is_transient() => Verdict::Retry { after: None },
            _ => Verdict::Stop,
        }
    }
}

/// Per-attempt view of the policy, created fresh for each logical call.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Zero-based attempt number.
    pub attempt: u32,
    policy: Arc<RetryPolicy>,
}

impl RetryContext {
    /// Attempts allowed in total.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts()
    }

    /// Delay before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.policy.base_delay
    }

    /// Statuses that count as transient.
    #[must_use]
    pub fn retryable_statuses(&self) -> &BTreeSet<u16> {
        &self.policy.retryable_statuses
    }

    /// Returns true if this is the last permitted attempt.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.attempt + 1 >= self.max_attempts()
    }
}

/// Result of [`RetryExecutor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<O> {
    /// Outcome of the final attempt.
    pub outcome: O,
    /// How many times the operation ran.
    pub attempts: u32,
    /// True if the final outcome was still retryable.
    pub exhausted: bool,
}

/// Runs an operation until it succeeds, fails permanently or runs out of
/// attempts.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: Arc<RetryPolicy>,
}

impl RetryExecutor {
    /// Creates an executor for `policy`.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// The policy in force.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `attempt` at most `max_retries + 1` times.
    ///
    /// Outcomes classified [`Verdict::Stop`] return immediately without
    /// consuming a retry.
    pub async fn run<O, F, Fut>(&self, mut attempt: F) -> Attempted<O>
    where
        O: Classify,
        F: FnMut(RetryContext) -> Fut,
        Fut: Future<Output = O>,
    {
        let mut retries = 0;
        loop {
            let ctx = RetryContext {
                attempt: retries,
                policy: Arc::clone(&self.policy),
            };
            let outcome = attempt(ctx).await;
            let attempts = retries + 1;

            let after = match outcome.classify(&self.policy) {
                Verdict::Stop => {
                    return Attempted {
                        outcome,
                        attempts,
                        exhausted: false,
                    };
                }
                Verdict::Retry { after } => after,
            };

            if retries >= self.policy.max_retries {
                debug!(attempts, "retries exhausted");
                return Attempted {
                    outcome,
                    attempts,
                    exhausted: true,
                };
            }

            let delay = self.delay(retries, after);
            debug!(attempt = attempts, ?delay, "transient failure, backing off");
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }

    fn delay(&self, retry_index: u32, after: Option<Duration>) -> Duration {
        let delay = self.policy.delay_for(retry_index, after);
        if self.policy.jitter && after.is_none() {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn status(code: u16) -> Result<ResponseSpec, ClientError> {
        Ok(ResponseSpec::with_status(code))
    }

    fn assert_offsets(actual: &[Duration], expected_ms: &[u64]) {
        assert_eq!(actual.len(), expected_ms.len(), "attempt count");
        for (got, want) in actual.iter().zip(expected_ms) {
            let want = Duration::from_millis(*want);
            assert!(
                *got >= want && *got <= want + Duration::from_millis(5),
                "attempt at {got:?}, expected {want:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_exhausted_with_backoff() {
        let executor = RetryExecutor::default();
        let start = Instant::now();
        let mut offsets = Vec::new();

        let attempted = executor
            .run(|_| {
                offsets.push(start.elapsed());
                async { status(503) }
            })
            .await;

        assert_eq!(attempted.attempts, 4);
        assert!(attempted.exhausted);
        assert_offsets(&offsets, &[0, 1000, 3000, 7000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_runs_once() {
        let executor = RetryExecutor::default();
        let calls = AtomicU32::new(0);

        let attempted = executor
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { status(404) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempted.attempts, 1);
        assert!(!attempted.exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_network_error() {
        let executor = RetryExecutor::default();

        let attempted = executor
            .run(|ctx| async move {
                if ctx.attempt == 0 {
                    Err(ClientError::new(ErrorKind::Network, "reset"))
                } else {
                    status(200)
                }
            })
            .await;

        assert_eq!(attempted.attempts, 2);
        assert!(attempted.outcome.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_lengthens_delay() {
        let executor = RetryExecutor::default();
        let start = Instant::now();
        let mut offsets = Vec::new();

        executor
            .run(|ctx| {
                offsets.push(start.elapsed());
                async move {
                    if ctx.attempt == 0 {
                        let mut headers = HashMap::new();
                        headers.insert("Retry-After".to_string(), "5".to_string());
                        Ok(ResponseSpec::new(429, headers, Vec::new(), Duration::ZERO))
                    } else {
                        status(200)
                    }
                }
            })
            .await;

        assert_offsets(&offsets, &[0, 5000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries() {
        let executor = RetryExecutor::new(RetryPolicy::none());
        let attempted = executor.run(|_| async { status(502) }).await;
        assert_eq!(attempted.attempts, 1);
        assert!(attempted.exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_errors() {
        let executor = RetryExecutor::default();
        let calls = AtomicU32::new(0);

        let attempted = executor
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<TokenGrant, _>(ProviderError::RefreshRejected("expired".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!attempted.exhausted);

        let attempted = executor
            .run(|_| async { Err::<TokenGrant, _>(ProviderError::Unavailable("down".into())) })
            .await;
        assert_eq!(attempted.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_stays_within_bounds() {
        let executor = RetryExecutor::new(RetryPolicy {
            jitter: true,
            max_retries: 1,
            ..RetryPolicy::default()
        });
        let start = Instant::now();
        let mut offsets = Vec::new();

        executor
            .run(|_| {
                offsets.push(start.elapsed());
                async { status(500) }
            })
            .await;

        assert!(offsets[1] >= Duration::from_millis(500));
        assert!(offsets[1] <= Duration::from_millis(1005));
    }
}
