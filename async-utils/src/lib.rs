//! Async helpers for futures that must give up early.
//!
//! [`OrCancelExt`] races any future against a `CancellationToken`, an
//! optional deadline, or both. Connectivity waits use the deadline form;
//! background monitors and backoff sleeps use the token form.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a raced future did not produce its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The cancellation token fired first.
    Cancelled,
    /// The deadline elapsed first.
    TimedOut,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupted::Cancelled => write!(f, "cancelled"),
            Interrupted::TimedOut => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for Interrupted {}

#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the cancellation token.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Interrupted>;

    /// Race this future against a deadline measured from now.
    ///
    /// The future is dropped (not polled further) when the deadline wins.
    async fn or_deadline(self, timeout: Duration) -> Result<Self::Output, Interrupted>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Interrupted> {
        tokio::select! {
            _ = token.cancelled() => Err(Interrupted::Cancelled),
            res = self => Ok(res),
        }
    }

    async fn or_deadline(self, timeout: Duration) -> Result<Self::Output, Interrupted> {
        tokio::time::timeout(timeout, self)
            .await
            .map_err(|_| Interrupted::TimedOut)
    }
}

/// Sleep for `duration` unless `token` fires first.
///
/// A cancelled token wins even when `duration` is zero.
pub async fn sleep_or_cancel(
    duration: Duration,
    token: &CancellationToken,
) -> Result<(), Interrupted> {
    if token.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::time::sleep(duration).or_cancel(token).await
}
