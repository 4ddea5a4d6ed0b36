//! Retry with exponential backoff, as an explicit state machine.
//!
//! ```text
//! Attempting(1) ──fail──▶ Waiting(1, 1s) ──▶ Attempting(2) ──fail──▶ Waiting(2, 2s)
//!      │                                          │                        │
//!      ok                                         ok                       ▼
//!      ▼                                          ▼                  Attempting(3) ──fail──▶ Exhausted(3)
//!  Succeeded                                  Succeeded
//! ```
//!
//! The delay after failed attempt `n` is `initial_delay * backoff_factor^(n-1)`.
//! There is no wait after the final attempt. Sleeping goes through a
//! [`Sleeper`] so tests can observe delays without spending them.

use std::fmt::Display;
use std::time::Duration;

/// Retry policy for explicit generation requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    /// Wait after the first failure.
    pub initial_delay: Duration,
    /// Multiplier applied to the wait after each further failure.
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial_delay
            .saturating_mul(self.backoff_factor.saturating_pow(exponent))
    }

    /// State to move to once attempt `attempt` has failed.
    #[must_use]
    pub fn after_failure<T>(&self, attempt: u32) -> RetryState<T> {
        if attempt >= self.attempts.max(1) {
            RetryState::Exhausted { attempts: attempt }
        } else {
            RetryState::Waiting {
                attempt,
                delay: self.delay_after(attempt),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState<T> {
    Attempting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Succeeded { attempt: u32, value: T },
    Exhausted { attempts: u32 },
}

impl<T> RetryState<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Exhausted { .. })
    }
}

/// Every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: Option<E>,
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for std::sync::Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Blocks the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Drive `attempt_fn` through the state machine until it succeeds or the
/// policy runs out. `attempt_fn` receives the 1-based attempt number.
pub fn run_with_retry<T, E, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut attempt_fn: F,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut state = RetryState::Attempting { attempt: 1 };
    let mut last_error = None;

    loop {
        state = match state {
            RetryState::Attempting { attempt } => match attempt_fn(attempt) {
                Ok(value) => RetryState::Succeeded { attempt, value },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "attempt failed");
                    last_error = Some(e);
                    policy.after_failure(attempt)
                }
            },
            RetryState::Waiting { attempt, delay } => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                sleeper.sleep(delay);
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            RetryState::Succeeded { attempt, value } => {
                tracing::debug!(attempt, "attempt succeeded");
                return Ok(value);
            }
            RetryState::Exhausted { attempts } => {
                return Err(RetryExhausted {
                    attempts,
                    last_error,
                });
            }
        };
    }
}
