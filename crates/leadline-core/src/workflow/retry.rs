//! Bounded exponential-backoff retry executor.
//!
//! Wraps exactly one step's external-call attempt. Retryable errors
//! (network failures, 5xx responses) consume retry budget with
//! `min(base * multiplier^(attempt-1), max)` backoff between attempts;
//! fatal errors (4xx, validation, an open circuit) abort immediately and
//! surface unchanged -- `CircuitOpen` in particular is never retried.

use std::future::Future;
use std::time::Duration;

use leadline_types::workflow::RetryPolicy;

use super::step::StepError;

// ---------------------------------------------------------------------------
// Attempt classification
// ---------------------------------------------------------------------------

/// How a single failed attempt should be treated by the retry loop.
#[derive(Debug)]
pub enum AttemptError {
    /// Consumes retry budget; the loop backs off and tries again.
    Retryable(StepError),
    /// Aborts immediately; the error is surfaced unchanged.
    Fatal(StepError),
}

impl AttemptError {
    /// Classify by the error's own retryability.
    pub fn classify(error: StepError) -> Self {
        if error.is_retryable() {
            AttemptError::Retryable(error)
        } else {
            AttemptError::Fatal(error)
        }
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Run `op` with up to `policy.max_attempts` total attempts.
///
/// `on_failure(attempt, error, will_retry)` fires for every failed attempt,
/// letting the caller publish events without the loop knowing about buses.
/// Exhausting the budget yields `StepError::RetryExhausted` wrapping the
/// last underlying error.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    step_id: &str,
    mut on_failure: impl FnMut(u32, &StepError, bool),
    mut op: F,
) -> Result<T, StepError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(error)) => {
                on_failure(attempt, &error, false);
                return Err(error);
            }
            Err(AttemptError::Retryable(error)) => {
                if attempt >= max_attempts {
                    on_failure(attempt, &error, false);
                    // A single-attempt policy never retried, so the raw
                    // error is the whole story.
                    return Err(if max_attempts > 1 {
                        StepError::RetryExhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        }
                    } else {
                        error
                    });
                }
                on_failure(attempt, &error, true);
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    step_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "step attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Backoff delay after failed attempt `attempt` (1-based), with up to 25%
/// jitter when the policy enables it.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.delay_for_attempt(attempt);
    if policy.jitter {
        let jitter = rand::random::<f64>() * 0.25 * base.as_secs_f64();
        base + Duration::from_secs_f64(jitter)
    } else {
        base
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
