//! Periodic background connection checks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::status::ConnectionRegister;

/// Handle to a running monitor task. Dropping it stops the task.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    /// Spawn a task that runs `check_connection` every `interval`.
    ///
    /// The first check happens one full interval after start. A `None`
    /// interval (configured as 0) returns an idle handle.
    pub fn start(register: Arc<ConnectionRegister>, interval: Option<Duration>) -> Self {
        let cancel = CancellationToken::new();
        let Some(interval) = interval.filter(|i| !i.is_zero()) else {
            tracing::debug!("connectivity monitor disabled");
            return Self { cancel, task: None };
        };

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            tracing::debug!(interval_ms = interval.as_millis() as u64, "connectivity monitor started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = register.check_connection() => {}
                        }
                    }
                }
            }
            tracing::debug!("connectivity monitor stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the task to stop without waiting for it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
