// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry for transient engine failures.
//!
//! Only errors classified [`ErrorClass::Retryable`] are attempted again.
//! The delay before attempt `n + 1` is `n * base`, capped at `max`, and is
//! raced against cancellation.

use std::future::Future;
use std::time::Duration;

use chatbridge_config::model::RetryConfig;
use chatbridge_core::{BridgeError, ErrorClass};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(2_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(attempt)
            .min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts, or
/// `cancel` fires.
///
/// Cancellation is checked before every attempt and during backoff sleeps.
/// A permanent failure is returned as [`BridgeError::NonRetryable`] after a
/// single attempt; exhausting the policy yields
/// [`BridgeError::RetriesExhausted`] wrapping the last error.
pub async fn with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled {
                label: label.to_string(),
            });
        }

        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if err.class() == ErrorClass::Permanent {
            return Err(BridgeError::NonRetryable {
                label: label.to_string(),
                source: Box::new(err),
            });
        }

        if attempt >= max_attempts {
            warn!(label, attempts = attempt, error = %err, "giving up after retries");
            return Err(BridgeError::RetriesExhausted {
                label: label.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = policy.backoff(attempt);
        warn!(
            label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retryable storage error, backing off"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(BridgeError::Cancelled { label: label.to_string() });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
