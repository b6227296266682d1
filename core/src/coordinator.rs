//! Connectivity-aware execution of caller operations.
//!
//! [`RequestCoordinator::execute`] makes sure the API is reachable before
//! running an operation, then retries it only while its failures classify as
//! [`ErrorClass::Network`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use successfuel_async_utils::OrCancelExt;
use tokio::sync::Notify;

use crate::config::{AppConfig, ConnectivityConfig};
use crate::health::HttpHealthProbe;
use crate::retry::{BackoffPolicy, ErrorClass, RetryClassifiable, RetryEngine};
use crate::status::{ConnectionRegister, Stability};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CONNECTION_WAIT: Duration = Duration::from_millis(5_000);

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// The API never became reachable within the connection wait.
    /// The operation was not invoked.
    #[error("no connection available")]
    NoConnection,

    #[error("network error after {attempts} attempt(s): {error}")]
    Network { error: E, attempts: u32 },

    #[error("{0}")]
    Application(E),
}

impl<E> ExecuteError<E> {
    /// The operation's own error, if it ran at all.
    pub fn into_inner(self) -> Option<E> {
        match self {
            ExecuteError::NoConnection => None,
            ExecuteError::Network { error, .. } => Some(error),
            ExecuteError::Application(error) => Some(error),
        }
    }

    pub fn is_no_connection(&self) -> bool {
        matches!(self, ExecuteError::NoConnection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Total attempts, including the first. Values below 1 run once.
    pub max_retries: u32,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ExecuteOptions {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

#[derive(Debug, Clone)]
pub struct RequestCoordinator {
    engine: RetryEngine,
    connection_wait: Duration,
    defaults: ExecuteOptions,
}

impl RequestCoordinator {
    pub fn new(engine: RetryEngine) -> Self {
        Self {
            engine,
            connection_wait: DEFAULT_CONNECTION_WAIT,
            defaults: ExecuteOptions::default(),
        }
    }

    pub fn from_config(engine: RetryEngine, config: &ConnectivityConfig) -> Self {
        Self {
            engine,
            connection_wait: config.connection_wait_timeout(),
            defaults: ExecuteOptions::with_max_retries(config.max_retries),
        }
    }

    /// Wire the HTTP probe, register and engine described by `config`.
    pub fn from_app_config(http: reqwest::Client, config: &AppConfig) -> Self {
        let probe = Arc::new(HttpHealthProbe::from_config(http, config));
        let register = Arc::new(
            ConnectionRegister::new(probe).with_stable_latency(config.connectivity.stable_latency()),
        );
        let engine = RetryEngine::new(register, BackoffPolicy::from_config(&config.connectivity));
        Self::from_config(engine, &config.connectivity)
    }

    pub fn with_connection_wait(mut self, timeout: Duration) -> Self {
        self.connection_wait = timeout;
        self
    }

    pub fn register(&self) -> &Arc<ConnectionRegister> {
        self.engine.register()
    }

    pub fn engine(&self) -> &RetryEngine {
        &self.engine
    }

    pub fn default_options(&self) -> ExecuteOptions {
        self.defaults
    }

    pub fn is_connection_stable(&self) -> bool {
        let status = self.register().status();
        status.is_connected && status.stability == Stability::Stable
    }

    /// Run `operation` with the configured default options.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifiable + std::fmt::Display,
    {
        self.execute_with(operation, self.defaults).await
    }

    pub async fn execute_with<F, Fut, T, E>(
        &self,
        operation: F,
        options: ExecuteOptions,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifiable + std::fmt::Display,
    {
        if !self.register().is_connected() && !self.wait_for_connection().await {
            tracing::warn!("no connection available, operation not attempted");
            return Err(ExecuteError::NoConnection);
        }
        self.run_attempts(operation, options).await
    }

    /// Force a check when offline, then wait for the connection.
    ///
    /// Returns whether the API is reachable afterwards.
    pub async fn handle_user_action(&self) -> bool {
        if self.register().is_connected() {
            return true;
        }
        if self.engine.force_retry().await.is_connected {
            return true;
        }
        self.wait_for_connection().await
    }

    /// [`Self::handle_user_action`] followed by [`Self::execute_with`].
    pub async fn execute_user_action<F, Fut, T, E>(
        &self,
        operation: F,
        options: ExecuteOptions,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifiable + std::fmt::Display,
    {
        if !self.handle_user_action().await {
            return Err(ExecuteError::NoConnection);
        }
        self.run_attempts(operation, options).await
    }

    /// Wait up to the connection timeout for the register to report a live
    /// connection, kicking off one backoff retry in the background.
    pub async fn wait_for_connection(&self) -> bool {
        let connected = Arc::new(Notify::new());
        let subscription = {
            let connected = Arc::clone(&connected);
            self.register().subscribe(move |status| {
                if status.is_connected {
                    connected.notify_one();
                }
            })
        };

        if self.register().is_connected() {
            subscription.unsubscribe();
            return true;
        }

        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.immediate_retry().await;
        });

        let notified = connected
            .notified()
            .or_deadline(self.connection_wait)
            .await
            .is_ok();
        subscription.unsubscribe();

        if !notified {
            tracing::debug!(
                timeout_ms = self.connection_wait.as_millis() as u64,
                "timed out waiting for connection"
            );
        }
        notified || self.register().is_connected()
    }

    async fn run_attempts<F, Fut, T, E>(
        &self,
        mut operation: F,
        options: ExecuteOptions,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassifiable + std::fmt::Display,
    {
        let max_attempts = options.max_retries.max(1);
        let backoff = self.engine.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.classify() {
                ErrorClass::Network if attempt < max_attempts => {
                    let delay = backoff.delay(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "network error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                ErrorClass::Network => {
                    tracing::warn!(attempts = attempt, error = %err, "network retries exhausted");
                    return Err(ExecuteError::Network {
                        error: err,
                        attempts: attempt,
                    });
                }
                ErrorClass::Application | ErrorClass::AuthRequired => {
                    tracing::debug!(error = %err, "operation failed, not retrying");
                    return Err(ExecuteError::Application(err));
                }
            }
        }
    }
}
