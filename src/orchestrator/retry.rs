//! Exponential-backoff retry for transient connectivity failures.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::Result;

/// Retries a block while it fails with a connectivity-class error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// `max_retries` counts every attempt, including the first.
    #[must_use]
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            initial_delay,
        }
    }

    /// Total attempts allowed.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Sleep after failed attempt `attempt` (1-based): `initial * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Run `block`, passing the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the block's error immediately when it is not a connectivity
    /// error, or the last connectivity error once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, mut block: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match block(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_connectivity() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %err,
                        "connectivity failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_connectivity() {
                        error!(attempt, %err, "connectivity retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
