//! Retry policy: bounded attempts with exponential backoff.

use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use assessor_contracts::{error::AssessorResult, task::TaskId};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after `attempts` failed attempts (1-indexed).
    ///
    /// `base_delay * multiplier^(attempts - 1)`, capped at `max_delay`.
    /// Growth past what a `Duration` can hold saturates at the cap.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if delay_secs.is_nan() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(delay_secs.max(0.0))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        task_id: &TaskId,
        mut op: F,
    ) -> AssessorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AssessorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(task_id = %task_id, operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.next_delay(attempt);
                    warn!(
                        task_id = %task_id,
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
