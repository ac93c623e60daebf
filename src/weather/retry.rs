//! Exponential backoff for calls to the weather services

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

/// Retry behaviour for fallible remote calls.
///
/// Only errors classified as transient by
/// [`WeatherwiseError::is_transient`](crate::error::WeatherwiseError::is_transient)
/// are retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 2)
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds (default: 500)
    pub base_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            multiplier,
        }
    }

    /// Single attempt, no backoff
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0, 1.0)
    }

    /// Delay before retry number `attempt` (0-indexed): `base * multiplier^attempt`
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = (self.base_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Runs `operation` until it succeeds, fails permanently, or retries run out.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label, attempts = attempt + 1, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
