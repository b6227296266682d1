//! Process-wide connection status register.
//!
//! The register owns the only mutable [`ConnectionStatus`]. Every write goes
//! through [`ConnectionRegister::write`], which applies one closure under the
//! lock and then notifies subscribers with the resulting snapshot, so no
//! observer ever sees a half-applied transition.
//!
//! Subscribers are never called during [`ConnectionRegister::subscribe`]; the
//! first notification a new subscriber receives is the next write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::{HealthProbe, ProbeOutcome};

/// Default latency under which a live connection counts as stable.
pub const DEFAULT_STABLE_LATENCY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Unstable,
    Offline,
}

impl Stability {
    /// Derive the label from connectivity and the last measured latency.
    ///
    /// A connection with no latency sample (manual override) is stable.
    pub fn classify(is_connected: bool, latency: Option<Duration>, threshold: Duration) -> Self {
        match (is_connected, latency) {
            (false, _) => Stability::Offline,
            (true, Some(latency)) if latency >= threshold => Stability::Unstable,
            (true, _) => Stability::Stable,
        }
    }
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stability::Stable => write!(f, "stable"),
            Stability::Unstable => write!(f, "unstable"),
            Stability::Offline => write!(f, "offline"),
        }
    }
}

/// Snapshot of the client's view of API connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    /// A probe is in flight.
    pub is_checking: bool,
    /// A backoff-delayed retry is pending.
    pub is_retrying: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    /// Consecutive failed checks since the last success.
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub stability: Stability,
    pub error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            is_connected: false,
            is_checking: false,
            is_retrying: false,
            last_check: None,
            latency_ms: None,
            retry_count: 0,
            next_retry_at: None,
            stability: Stability::Offline,
            error: None,
        }
    }
}

impl ConnectionStatus {
    /// A probe or a scheduled retry is currently in progress.
    pub fn is_busy(&self) -> bool {
        self.is_checking || self.is_retrying
    }
}

type Listener = Arc<dyn Fn(&ConnectionStatus) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// Handle returned by [`ConnectionRegister::subscribe`].
///
/// Dropping the handle unsubscribes. Calling [`Subscription::unsubscribe`]
/// more than once is a no-op.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub struct ConnectionRegister {
    probe: Arc<dyn HealthProbe>,
    stable_latency: Duration,
    state: Mutex<ConnectionStatus>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl ConnectionRegister {
    /// Create a register in the default offline state.
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            probe,
            stable_latency: DEFAULT_STABLE_LATENCY,
            state: Mutex::new(ConnectionStatus::default()),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    pub fn with_stable_latency(mut self, threshold: Duration) -> Self {
        self.stable_latency = threshold;
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.state).clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).is_connected
    }

    /// Register `listener` for every subsequent state write.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.listeners);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Arc::new(listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).listeners.len()
    }

    /// Probe the API once and record the outcome.
    ///
    /// This is the only path that moves `retry_count`: success resets it to
    /// zero, failure adds exactly one to the value current at completion.
    pub async fn check_connection(&self) -> ConnectionStatus {
        self.write(|status| {
            status.is_checking = true;
            status.is_retrying = false;
            status.error = None;
        });

        let mut pending = PendingCheck {
            register: self,
            settled: false,
        };
        let outcome = self.probe.probe().await;
        pending.settled = true;
        self.complete_check(outcome)
    }

    fn complete_check(&self, outcome: ProbeOutcome) -> ConnectionStatus {
        let threshold = self.stable_latency;
        let mut was_connected = false;
        let snapshot = self.write(|status| {
            was_connected = status.is_connected;
            status.is_connected = outcome.healthy;
            status.is_checking = false;
            status.is_retrying = false;
            status.next_retry_at = None;
            status.last_check = Some(Utc::now());
            status.latency_ms = Some(outcome.latency.as_millis().try_into().unwrap_or(u64::MAX));
            status.stability = Stability::classify(outcome.healthy, Some(outcome.latency), threshold);
            if outcome.healthy {
                status.retry_count = 0;
                status.error = None;
            } else {
                status.retry_count = status.retry_count.saturating_add(1);
                status.error = Some(
                    outcome
                        .message
                        .clone()
                        .unwrap_or_else(|| "Connection failed".to_string()),
                );
            }
        });

        match (was_connected, snapshot.is_connected) {
            (false, true) => tracing::info!(
                latency_ms = ?snapshot.latency_ms,
                stability = %snapshot.stability,
                "API connection established"
            ),
            (true, false) => tracing::warn!(
                error = ?snapshot.error,
                "API connection lost"
            ),
            (false, false) => tracing::debug!(
                retry_count = snapshot.retry_count,
                error = ?snapshot.error,
                "health check failed"
            ),
            (true, true) => tracing::debug!(
                latency_ms = ?snapshot.latency_ms,
                stability = %snapshot.stability,
                "health check ok"
            ),
        }
        snapshot
    }

    /// Restore the default offline state.
    pub fn reset(&self) {
        self.write(|status| *status = ConnectionStatus::default());
    }

    /// Override connectivity without probing.
    pub fn set_manual_status(&self, connected: bool) {
        self.write(|status| {
            status.is_connected = connected;
            status.last_check = Some(Utc::now());
            status.stability = if connected {
                Stability::Stable
            } else {
                Stability::Offline
            };
            status.retry_count = 0;
            status.is_retrying = false;
            status.next_retry_at = None;
        });
    }

    /// Atomically claim the retry window.
    ///
    /// Returns the retry count the backoff should be keyed off, or `None` if a
    /// check or retry is already in flight.
    pub(crate) fn try_begin_retry(
        &self,
        next_retry_at: impl FnOnce(u32) -> DateTime<Utc>,
    ) -> Option<u32> {
        let claimed = {
            let mut status = lock(&self.state);
            if status.is_busy() {
                None
            } else {
                status.is_retrying = true;
                status.error = None;
                status.next_retry_at = Some(next_retry_at(status.retry_count));
                Some((status.retry_count, status.clone()))
            }
        };
        let (retry_count, snapshot) = claimed?;
        self.notify(&snapshot);
        Some(retry_count)
    }

    /// Enter the retry window unconditionally.
    pub(crate) fn begin_forced_retry(&self) {
        self.write(|status| {
            status.is_retrying = true;
            status.error = None;
        });
    }

    fn write(&self, mutate: impl FnOnce(&mut ConnectionStatus)) -> ConnectionStatus {
        let snapshot = {
            let mut status = lock(&self.state);
            mutate(&mut status);
            status.clone()
        };
        self.notify(&snapshot);
        snapshot
    }

    fn notify(&self, snapshot: &ConnectionStatus) {
        let listeners: Vec<Listener> = lock(&self.listeners).listeners.values().cloned().collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Clears `is_checking` when a check is dropped before the health request returns.
struct PendingCheck<'a> {
    register: &'a ConnectionRegister,
    settled: bool,
}

impl Drop for PendingCheck<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("connection check cancelled before completion");
            self.register.write(|status| status.is_checking = false);
        }
    }
}

impl std::fmt::Debug for ConnectionRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegister")
            .field("status", &self.status())
            .field("stable_latency", &self.stable_latency)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
