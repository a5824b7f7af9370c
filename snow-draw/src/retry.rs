//! Optimistic Commit Retry
//!
//! Backoff policy for commits that lose a version race.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DrawError, DrawResult};

/// Retry strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,
    /// Fixed delay between attempts
    Fixed { delay_ms: u64 },
    /// Exponential backoff
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 5,
            max_delay_ms: 200,
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Calculate delay for attempt number (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            RetryStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay = (*initial_delay_ms as f64) * multiplier.powi(exponent);
                let delay = delay.min(*max_delay_ms as f64);
                Duration::from_millis(delay as u64)
            }
        }
    }
}

/// Bounded retry loop for compare-and-swap commits.
///
/// Only [`DrawError::Conflict`] is retried. Every other error is returned
/// to the caller on the attempt that produced it.
#[derive(Debug, Clone)]
pub struct CommitRetry {
    strategy: RetryStrategy,
    max_attempts: u32,
}

impl Default for CommitRetry {
    fn default() -> Self {
        Self::new(RetryStrategy::default(), 8)
    }
}

impl CommitRetry {
    /// Create a retry loop
    pub fn new(strategy: RetryStrategy, max_attempts: u32) -> Self {
        Self {
            strategy,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Maximum attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> DrawResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DrawResult<T>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_conflict() => {
                    debug!(operation, attempt, error = %e, "Commit lost version race, retrying");
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.strategy.delay_for_attempt(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        warn!(operation, attempts = self.max_attempts, "Commit retries exhausted");
        Err(DrawError::RetryExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
