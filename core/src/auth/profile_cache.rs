//! Single-flight, time-bounded cache for the user profile.
//!
//! At most one fetch runs per guard. Callers arriving while it runs share
//! its result. A successful result is cached for the TTL and replaced
//! wholesale by the next fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(5 * 60);

/// Failure shared by every caller of one fetch.
#[derive(Debug, thiserror::Error)]
pub enum ProfileFetchError<E> {
    #[error("{0}")]
    Failed(Arc<E>),

    /// The fetch task panicked or was aborted before producing a value.
    #[error("profile fetch aborted: {0}")]
    Aborted(String),
}

impl<E> Clone for ProfileFetchError<E> {
    fn clone(&self) -> Self {
        match self {
            ProfileFetchError::Failed(e) => ProfileFetchError::Failed(Arc::clone(e)),
            ProfileFetchError::Aborted(msg) => ProfileFetchError::Aborted(msg.clone()),
        }
    }
}

impl<E> ProfileFetchError<E> {
    pub fn inner(&self) -> Option<&E> {
        match self {
            ProfileFetchError::Failed(e) => Some(e),
            ProfileFetchError::Aborted(_) => None,
        }
    }
}

type FetchResult<T, E> = Result<T, ProfileFetchError<E>>;
type SharedFetch<T, E> = Shared<BoxFuture<'static, FetchResult<T, E>>>;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

struct InFlight<T, E> {
    id: u64,
    fetch: SharedFetch<T, E>,
}

struct GuardState<T, E> {
    cache: Option<CacheEntry<T>>,
    in_flight: Option<InFlight<T, E>>,
    /// Bumped by invalidation and forced refreshes. A fetch only writes back
    /// when the generation it started under is still current.
    generation: u64,
}

pub struct ProfileCacheGuard<T, E> {
    ttl: Duration,
    state: Arc<Mutex<GuardState<T, E>>>,
    next_fetch_id: AtomicU64,
}

impl<T, E> ProfileCacheGuard<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(Mutex::new(GuardState {
                cache: None,
                in_flight: None,
                generation: 0,
            })),
            next_fetch_id: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the profile, fetching it with `fetcher` only when needed.
    ///
    /// Without `force_refresh`, a running fetch is joined and a valid cache
    /// entry is returned as is. `fetcher` is called at most once, and only
    /// when a new fetch starts.
    pub async fn fetch<F, Fut>(&self, force_refresh: bool, fetcher: F) -> FetchResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetch = {
            let mut state = lock(&self.state);
            if force_refresh {
                state.generation += 1;
                self.start_fetch(&mut state, fetcher())
            } else if let Some(in_flight) = &state.in_flight {
                tracing::debug!("profile fetch in flight, joining");
                in_flight.fetch.clone()
            } else if let Some(entry) = state
                .cache
                .as_ref()
                .filter(|entry| entry.is_valid_at(Instant::now()))
            {
                tracing::debug!("using cached profile");
                return Ok(entry.data.clone());
            } else {
                self.start_fetch(&mut state, fetcher())
            }
        };

        fetch.await
    }

    fn start_fetch<Fut>(&self, state: &mut GuardState<T, E>, fetch: Fut) -> SharedFetch<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let generation = state.generation;
        let ttl = self.ttl;
        let shared_state = Arc::clone(&self.state);

        tracing::debug!(id, generation, "starting profile fetch");
        // The task settles the marker even if every caller stops waiting.
        let task = tokio::spawn(async move {
            let result = fetch.await.map_err(|e| ProfileFetchError::Failed(Arc::new(e)));

            let mut state = lock(&shared_state);
            if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
                state.in_flight = None;
            }
            match &result {
                Ok(data) if state.generation == generation => {
                    state.cache = Some(CacheEntry {
                        data: data.clone(),
                        fetched_at: Instant::now(),
                        ttl,
                    });
                }
                Ok(_) => tracing::debug!(id, "discarding profile from a superseded fetch"),
                Err(_) => tracing::debug!(id, "profile fetch failed"),
            }
            result
        });

        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => Err(ProfileFetchError::Aborted(join_err.to_string())),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            id,
            fetch: fetch.clone(),
        });
        fetch
    }

    /// Drop the cached entry and forget any running fetch.
    ///
    /// A running fetch keeps going but cannot write its result back.
    pub fn invalidate(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.cache = None;
        state.in_flight = None;
    }

    /// Cached data if still valid, without fetching.
    pub fn cached(&self) -> Option<T> {
        let state = lock(&self.state);
        state
            .cache
            .as_ref()
            .filter(|entry| entry.is_valid_at(Instant::now()))
            .map(|entry| entry.data.clone())
    }

    pub fn is_fetching(&self) -> bool {
        lock(&self.state).in_flight.is_some()
    }
}

impl<T, E> std::fmt::Debug for ProfileCacheGuard<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ProfileCacheGuard")
            .field("ttl", &self.ttl)
            .field("cached", &state.cache.is_some())
            .field("in_flight", &state.in_flight.is_some())
            .field("generation", &state.generation)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
