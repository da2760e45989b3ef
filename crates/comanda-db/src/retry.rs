//! # Retry on Lock Contention
//!
//! Generic wrapper that reruns a whole transaction body when it fails with a
//! transient error (lock wait timeout), up to a small fixed bound.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  with_retry(policy, |attempt| async { begin → body → commit })          │
//! │                                                                         │
//! │  attempt 1 ──► Ok(v) ─────────────────────────────► Ok(v)               │
//! │      │                                                                  │
//! │      └──► Err(e), e.is_transient() == false ──────► Failed(e)           │
//! │      │                                                                  │
//! │      └──► Err(e), transient ──► sleep(backoff) ──► attempt 2 ...        │
//! │                                                                         │
//! │  attempt N transient ─────────────────────────────► Exhausted { N, e }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The body receives the attempt number (1-based) and must be rerunnable with
//! the same inputs: every attempt opens a fresh transaction, and the failed
//! one has already been rolled back when the error reaches this loop.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::warn;

/// Classifies an error as safe to retry.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retry bound and pacing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff: Duration,

    /// Ceiling for the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            randomization_factor: 0.3,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error; `last` is the final one.
    Exhausted { attempts: u32, last: E },

    /// A non-transient error, returned unchanged on the attempt it occurred.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Failed(e) => Some(e),
        }
    }
}

/// Runs `op` until it succeeds, fails non-transiently, or the attempt bound
/// is reached.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.create_backoff();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(RetryError::Failed(err)),
            Err(err) if attempt >= max_attempts => {
                warn!(attempts = attempt, error = %err, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
