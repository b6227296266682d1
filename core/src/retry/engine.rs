//! Reconnection driver
//!
//! Every entry point here ends in [`ConnectionRegister::check_connection`];
//! the engine only decides when to call it.

use std::sync::Arc;

use chrono::Utc;
use successfuel_async_utils::sleep_or_cancel;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use crate::status::{ConnectionRegister, ConnectionStatus};

#[derive(Debug, Clone)]
pub struct RetryEngine {
    register: Arc<ConnectionRegister>,
    backoff: BackoffPolicy,
}

impl RetryEngine {
    pub fn new(register: Arc<ConnectionRegister>, backoff: BackoffPolicy) -> Self {
        Self { register, backoff }
    }

    pub fn register(&self) -> &Arc<ConnectionRegister> {
        &self.register
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Schedule one backoff-delayed check.
    ///
    /// Returns `None` without touching state when a check or retry is already
    /// in flight. Otherwise sleeps `delay(retry_count)` and returns the status
    /// written by the check.
    pub async fn immediate_retry(&self) -> Option<ConnectionStatus> {
        let backoff = self.backoff;
        let retry_count = self.register.try_begin_retry(|retry_count| {
            let now = Utc::now();
            chrono::Duration::from_std(backoff.delay(retry_count))
                .ok()
                .and_then(|delay| now.checked_add_signed(delay))
                .unwrap_or(now)
        });
        let Some(retry_count) = retry_count else {
            tracing::debug!("retry skipped, check already in flight");
            return None;
        };

        let delay = self.backoff.delay(retry_count);
        tracing::debug!(retry_count, delay_ms = delay.as_millis() as u64, "scheduling retry");
        tokio::time::sleep(delay).await;
        Some(self.register.check_connection().await)
    }

    /// Check right now, ignoring any retry already scheduled.
    pub async fn force_retry(&self) -> ConnectionStatus {
        tracing::debug!("forcing connection check");
        self.register.begin_forced_retry();
        self.register.check_connection().await
    }

    /// Check, then re-check up to `max_retries` more times with backoff
    /// between attempts. Stops at the first success.
    pub async fn check_connection_with_retry(&self, max_retries: u32) -> ConnectionStatus {
        self.check_connection_with_retry_cancellable(max_retries, &CancellationToken::new())
            .await
    }

    /// Like [`Self::check_connection_with_retry`], but a cancelled `token`
    /// ends the loop during a backoff sleep and returns the last status.
    pub async fn check_connection_with_retry_cancellable(
        &self,
        max_retries: u32,
        token: &CancellationToken,
    ) -> ConnectionStatus {
        let mut attempt = 0;
        loop {
            let status = self.register.check_connection().await;
            if status.is_connected || attempt >= max_retries {
                if !status.is_connected {
                    tracing::warn!(
                        attempts = attempt + 1,
                        error = ?status.error,
                        "connection check retries exhausted"
                    );
                }
                return status;
            }

            let delay = self.backoff.delay(attempt);
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "connection check failed, backing off"
            );
            if sleep_or_cancel(delay, token).await.is_err() {
                tracing::debug!("connection retry loop cancelled");
                return status;
            }
            attempt += 1;
        }
    }
}
