//! Retry with exponential backoff for transient backend failures
//!
//! Applies to health checks and chat requests made through a backend. Workflow
//! step execution is never retried.

use super::error::BackendError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 1;
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry parameters. Stateless; never mutated during use.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    /// Total number of attempts, including the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RecoveryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_backoff,
            multiplier,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        Duration::from_secs_f64(self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent))
    }

    /// Runs `op` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// The last error is surfaced unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let attempts = self.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", operation, attempt, attempts);
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    debug!("{} failed with non-transient error: {}", operation, err);
                    return Err(err);
                }
                Err(err) if attempt >= attempts => {
                    warn!("{} failed after {} attempts: {}", operation, attempts, err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:.1}s",
                        operation,
                        attempt,
                        attempts,
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
