// SPDX-License-Identifier: GPL-3.0-only

//! Retry with exponential backoff for collaborator calls

use crate::errors::{GatewayError, GatewayResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// How often and how patiently a collaborator call is retried
///
/// Only [`GatewayError::Transient`] failures are retried. A call that does
/// not finish within `attempt_timeout` counts as a transient failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub backoff_base: Duration,
    /// Upper bound for any single delay
    pub backoff_max: Duration,
    pub attempt_timeout: Duration,
}

/// Why a retried call gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError {
    /// Every attempt failed transiently
    Exhausted { attempts: u32, last: GatewayError },
    /// A failure that retrying cannot fix
    Permanent(GatewayError),
    /// Shutdown cancelled the call
    Cancelled,
}

impl RetryError {
    /// The collaborator error behind the failure, if any
    pub fn into_gateway_error(self) -> Option<GatewayError> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Permanent(e) => Some(e),
            RetryError::Cancelled => None,
        }
    }
}

/// Cooperative cancellation signal shared by all workers
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never resolves if the
    /// sending side is dropped without cancelling
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Run `call` until it succeeds, fails permanently, runs out of attempts
    /// or `cancel` fires
    ///
    /// `call` receives the 1-based attempt number. Cancellation interrupts
    /// both an in-flight attempt and a backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &mut CancelToken,
        mut call: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = tokio::time::timeout(self.attempt_timeout, call(attempt)) => result,
            };

            let err = match result {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Transient(format!(
                    "timed out after {}ms",
                    self.attempt_timeout.as_millis()
                )),
            };

            if !err.is_retryable() {
                warn!(operation, attempt, error = %err, "Permanent failure, not retrying");
                return Err(RetryError::Permanent(err));
            }
            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.delay_after(attempt);
            debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
