// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Default number of attempts per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between two attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sequential retry policy for one download.
///
/// Attempts never overlap. The delay is slept between attempts only, never
/// after the last one. Non-retryable errors ([`FetchError::is_retryable`])
/// are returned as-is after the first attempt unless `retry_everything` is
/// set, in which case every error is retried the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub retry_everything: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            retry_everything: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_everything: false,
        }
    }

    /// Retry every error, including ones that cannot succeed on a later attempt.
    pub fn with_retry_everything(mut self, retry_everything: bool) -> Self {
        self.retry_everything = retry_everything;
        self
    }

    /// Run `attempt` until it succeeds or the policy gives up.
    ///
    /// `attempt` receives the 1-based attempt number. On exhaustion the
    /// returned [`FetchError::RetriesExhausted`] wraps the last error. A
    /// non-retryable error after a retryable one also ends the loop, wrapping
    /// the earlier retryable error as the cause.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt_no = 1;
        // Most recent retryable failure; a later non-retryable error is
        // usually a consequence of it (its own partial file).
        let mut previous: Option<FetchError> = None;

        loop {
            let err = match attempt(attempt_no).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.retry_everything && !err.is_retryable() {
                tracing::debug!(job = label, error = %err, "error is not retryable, giving up");
                return Err(match previous {
                    Some(cause) => FetchError::RetriesExhausted {
                        attempts: attempt_no,
                        last: Box::new(cause),
                    },
                    None => err,
                });
            }

            if attempt_no >= max_attempts {
                return Err(FetchError::RetriesExhausted {
                    attempts: attempt_no,
                    last: Box::new(err),
                });
            }

            tracing::debug!(job = label, attempt = attempt_no, error = %err, "attempt failed");
            tokio::time::sleep(self.delay).await;

            attempt_no += 1;
            tracing::warn!(
                job = label,
                retry = attempt_no - 1,
                "Retry #{} for {}: {}",
                attempt_no - 1,
                label,
                err
            );
            previous = Some(err);
        }
    }
}
