//! Retryable request abstraction shared by every stage that talks to Etherscan.
//!
//! A [`RetryPolicy`] says how many attempts a request gets, how long to cool
//! down between them, how the per-attempt timeout grows and which failures
//! are worth another attempt. [`try_request`] drives one request under a
//! policy and returns `Ok(None)` once the attempt budget is spent.

use crate::app::ports::{FetchError, SleeperPort};
use crate::metrics::RequestMetrics;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Which transport failures earn another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retryable {
    /// Only timeouts are transient; anything else is returned to the caller
    #[default]
    TimeoutsOnly,
    /// Timeouts and any other transport error
    AnyTransport,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown: Duration,
    pub initial_timeout: Duration,
    /// Multiplier applied to the timeout after each retryable failure
    pub backoff_factor: u32,
    pub max_timeout: Duration,
    pub retry_on: Retryable,
}

impl RetryPolicy {
    /// Same timeout on every attempt.
    pub fn fixed(max_attempts: u32, timeout: Duration, cooldown: Duration) -> Self {
        Self {
            max_attempts,
            cooldown,
            initial_timeout: timeout,
            backoff_factor: 1,
            max_timeout: timeout,
            retry_on: Retryable::TimeoutsOnly,
        }
    }

    /// Timeout multiplied by `factor` after each timeout, capped at `max_timeout`.
    pub fn backoff(
        max_attempts: u32,
        initial_timeout: Duration,
        factor: u32,
        max_timeout: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            max_attempts,
            cooldown,
            initial_timeout,
            backoff_factor: factor.max(1),
            max_timeout: max_timeout.max(initial_timeout),
            retry_on: Retryable::TimeoutsOnly,
        }
    }

    pub fn retry_on(mut self, retry_on: Retryable) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn is_retryable(&self, err: &FetchError) -> bool {
        match (self.retry_on, err) {
            (_, FetchError::Timeout(_)) => true,
            (Retryable::AnyTransport, FetchError::Transport(_)) => true,
            (Retryable::TimeoutsOnly, FetchError::Transport(_)) => false,
        }
    }
}

/// Per-request bookkeeping, dropped on success or exhaustion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_made: u32,
    pub timeout: Duration,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self { attempts_made: 0, timeout: policy.initial_timeout }
    }

    fn record_failure(&mut self, policy: &RetryPolicy) {
        self.attempts_made += 1;
        self.timeout = self
            .timeout
            .checked_mul(policy.backoff_factor)
            .unwrap_or(policy.max_timeout)
            .min(policy.max_timeout);
    }

    pub fn exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts_made >= policy.max_attempts
    }
}

/// Runs `op` under `policy`. `op` receives the timeout for the attempt.
///
/// Returns `Ok(Some(_))` on the first attempt that produced a response,
/// `Ok(None)` when every attempt failed with a retryable error, and `Err`
/// for a failure the policy does not retry. Non-200 responses count as
/// responses; callers check the status themselves.
pub async fn try_request<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn SleeperPort,
    unit: &str,
    mut op: F,
) -> Result<Option<T>, FetchError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut state = RetryState::new(policy);
    loop {
        match op(state.timeout).await {
            Ok(value) => return Ok(Some(value)),
            Err(err) if policy.is_retryable(&err) => {
                RequestMetrics::record_retryable_failure();
                state.record_failure(policy);
                if state.exhausted(policy) {
                    warn!(unit, attempts = state.attempts_made, "{}, reached request limit", err);
                    RequestMetrics::record_exhausted();
                    return Ok(None);
                }
                warn!(unit, attempt = state.attempts_made, "{}, trying again", err);
                sleeper.sleep(policy.cooldown).await;
            }
            Err(err) => return Err(err),
        }
    }
}
