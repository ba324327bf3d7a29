//! Bounded retry policy
//!
//! Replaces ad hoc sleep loops: a fixed attempt budget with a backoff
//! between attempts, cancellable through a [`CancellationToken`].

use std::fmt::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Delay between consecutive attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every failed attempt, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    Exhausted { attempts: u32, last: E },
    /// Token cancelled before the next attempt
    Cancelled { attempts: u32 },
}

/// Attempt budget plus backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, `attempt` counting from 1
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                initial.saturating_mul(1 << shift).min(max)
            }
        }
    }

    /// Run `op` until it succeeds, the budget runs out, or `cancel` fires
    ///
    /// `op` receives the 1-based attempt number. The token is checked before
    /// every attempt and while waiting out the backoff.
    pub async fn run<T, E: Display>(
        &self,
        cancel: &CancellationToken,
        mut op: impl AsyncFnMut(u32) -> Result<T, E>,
    ) -> Result<T, RetryError<E>> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, backing off"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, two seconds apart
    fn default() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_secs(2)))
    }
}
