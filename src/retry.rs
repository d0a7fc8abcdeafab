use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::AbortSignal;
use crate::error::{Result, SubflowError};

/// Bounded retry with doubling backoff for idempotent backend calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt timeout; an expired attempt counts as a transient failure
    pub timeout: Option<Duration>,
}

/// Bound a single backend call; an expired call is a transient failure.
pub async fn within<F, T>(limit: Option<Duration>, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SubflowError::TransientNetwork(format!(
                "request timed out after {}ms",
                limit.as_millis()
            ))),
        },
        None => request.await,
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent.
    ///
    /// Once `signal` has fired no further attempt is started and the call
    /// ends with `Cancelled`, also when the abort lands during a backoff.
    pub async fn run<F, Fut, T>(&self, label: &str, signal: &AbortSignal, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match within(self.timeout, operation(attempt)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    if signal.is_aborted() {
                        debug!("{} attempt {} failed after abort, not retrying: {}", label, attempt, e);
                        return Err(SubflowError::Cancelled);
                    }
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}, retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = signal.aborted() => return Err(SubflowError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
