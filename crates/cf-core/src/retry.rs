//! Bounded retry for optimistic writes that lost a race.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};

/// How many times an engine re-plans a write after a [`AppError::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Linear backoff unit. After attempt `n` the engine sleeps `n * backoff`
    /// plus a random share of one more `backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    /// Pause before re-planning after the `attempt`-th try lost a race.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff * attempt;
        let spread = u64::try_from(self.backoff.as_micros()).unwrap_or(u64::MAX);
        if spread == 0 {
            return base;
        }
        base + Duration::from_micros(rand::random_range(0..=spread))
    }

    /// Runs `attempt` until it returns something other than a conflict or the
    /// attempts run out. Each call must re-read the state it plans from.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(AppError::Conflict(reason)) if tries < max_attempts => {
                    tracing::debug!(op, attempt = tries, %reason, "write lost a race; re-planning");
                    let pause = self.delay(tries);
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    tries += 1;
                }
                Err(AppError::Conflict(reason)) => {
                    tracing::warn!(op, attempts = tries, %reason, "giving up after repeated conflicts");
                    return Err(AppError::Conflict(format!("{op}: {reason} after {tries} attempts")));
                }
                other => return other,
            }
        }
    }
}
