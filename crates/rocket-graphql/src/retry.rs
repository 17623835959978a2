//! Backoff policy and the interceptor that applies it.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::client::GraphqlClientMetrics;
use crate::error::GraphqlClientError;
use crate::interceptor::{Interceptor, Next, OperationRequest, RawResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    DoNotRetry,
}

/// Which operations a [`RetryPolicy`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    Never,
    /// Queries and anything else flagged idempotent.
    IdempotentOnly,
    /// Mutations too. Only safe when the server deduplicates.
    Always,
}

/// Exponential backoff: `base_delay * 2^(attempt - 1)`, capped at
/// `max_delay`, plus up to `max_jitter` of random spread.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total sends, the first one included.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            max_jitter: Duration::from_millis(150),
            strategy: RetryStrategy::IdempotentOnly,
        }
    }
}

impl RetryPolicy {
    /// Send once, never retry.
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            strategy: RetryStrategy::Never,
            ..Self::default()
        }
    }

    const fn allows(&self, idempotent: bool) -> bool {
        match self.strategy {
            RetryStrategy::Never => false,
            RetryStrategy::IdempotentOnly => idempotent,
            RetryStrategy::Always => true,
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let doublings = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let scaled = self
            .base_delay
            .checked_mul(2_u32.saturating_pow(doublings))
            .unwrap_or(self.max_delay);
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..=self.max_jitter)
        };
        scaled.min(self.max_delay) + jitter
    }

    /// `attempt` is the 1-based number of the send that just failed.
    #[must_use]
    pub fn decide(
        &self,
        error: &GraphqlClientError,
        attempt: usize,
        idempotent: bool,
    ) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_retryable() || !self.allows(idempotent) {
            return RetryDecision::DoNotRetry;
        }
        let delay = self.backoff(attempt);
        // A longer Retry-After from the server wins, within max_delay.
        let delay = match error {
            GraphqlClientError::HttpStatus {
                retry_after: Some(hint),
                ..
            } => delay.max((*hint).min(self.max_delay)),
            _ => delay,
        };
        RetryDecision::RetryAfter(delay)
    }
}

/// Re-runs the downstream chain according to a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryInterceptor {
    policy: RetryPolicy,
    metrics: Option<Arc<GraphqlClientMetrics>>,
}

impl RetryInterceptor {
    /// Create an interceptor with `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: None,
        }
    }

    /// Count retries in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<GraphqlClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn intercept(
        &self,
        request: OperationRequest,
        next: Next<'_>,
    ) -> Result<RawResponse, GraphqlClientError> {
        let mut attempt = 1;
        loop {
            let err = match next.run(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            match self.policy.decide(&err, attempt, request.idempotent) {
                RetryDecision::RetryAfter(delay) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.requests_retried.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!(
                        operation = %request.operation_name,
                        attempt,
                        "retrying GraphQL request after {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::DoNotRetry => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;
    use crate::error::AuthFailure;

    fn server_error(retry_after: Option<Duration>) -> GraphqlClientError {
        GraphqlClientError::HttpStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
            retry_after,
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            ..no_jitter()
        };
        let err = server_error(None);
        assert_eq!(
            policy.decide(&err, 1, true),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(&err, 2, true),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            policy.decide(&err, 3, true),
            RetryDecision::RetryAfter(Duration::from_millis(350))
        );
    }

    #[test]
    fn stops_at_max_attempts() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&server_error(None), 3, true),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn mutations_not_retried_by_default() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&server_error(None), 1, false),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn non_retryable_errors() {
        let policy = no_jitter();
        let auth = GraphqlClientError::AuthenticationRequired {
            operation: "BookTrip".to_string(),
            reason: AuthFailure::MissingCredential,
        };
        assert_eq!(policy.decide(&auth, 1, true), RetryDecision::DoNotRetry);
        assert_eq!(
            RetryPolicy::never().decide(&server_error(None), 1, true),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn retry_after_hint_extends_delay() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&server_error(Some(Duration::from_secs(2))), 1, true),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
    }
}
