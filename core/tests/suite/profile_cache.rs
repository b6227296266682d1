use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use successfuel_core::auth::ProfileCacheGuard;

use super::common::CallCounter;

const TTL: Duration = Duration::from_millis(300_000);

fn guard() -> Arc<ProfileCacheGuard<String, String>> {
    Arc::new(ProfileCacheGuard::new(TTL))
}

async fn fetch_counted(
    guard: &ProfileCacheGuard<String, String>,
    calls: &CallCounter,
    force: bool,
) -> Option<String> {
    let calls = calls.clone();
    guard
        .fetch(force, move || async move {
            let n = calls.hit();
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(format!("profile-{n}"))
        })
        .await
        .ok()
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_call() {
    let guard = guard();
    let calls = CallCounter::default();

    let results = join_all((0..5).map(|_| fetch_counted(&guard, &calls, false))).await;

    assert_eq!(calls.get(), 1);
    assert_eq!(results, vec![Some("profile-1".to_string()); 5]);
    assert!(!guard.is_fetching());
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_failure() {
    let guard = guard();
    let calls = CallCounter::default();

    let results = join_all((0..5).map(|_| {
        let calls = calls.clone();
        guard.fetch(false, move || async move {
            calls.hit();
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err::<String, _>("503 Service Unavailable".to_string())
        })
    }))
    .await;

    assert_eq!(calls.get(), 1);
    for result in results {
        let err = result.expect_err("fetch should fail");
        assert_eq!(err.inner().map(String::as_str), Some("503 Service Unavailable"));
    }
}

#[tokio::test(start_paused = true)]
async fn ttl_boundary_is_exclusive() {
    let guard = guard();
    let calls = CallCounter::default();

    fetch_counted(&guard, &calls, false).await;
    assert_eq!(calls.get(), 1);

    tokio::time::advance(TTL - Duration::from_millis(1)).await;
    assert_eq!(
        fetch_counted(&guard, &calls, false).await.as_deref(),
        Some("profile-1")
    );
    assert_eq!(calls.get(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(
        fetch_counted(&guard, &calls, false).await.as_deref(),
        Some("profile-2")
    );
    assert_eq!(calls.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_bypasses_cache_and_in_flight() {
    let guard = guard();
    let calls = CallCounter::default();

    fetch_counted(&guard, &calls, false).await;
    let forced = fetch_counted(&guard, &calls, true).await;

    assert_eq!(forced.as_deref(), Some("profile-2"));
    assert_eq!(guard.cached().as_deref(), Some("profile-2"));
}

#[tokio::test(start_paused = true)]
async fn invalidate_clears_cache() {
    let guard = guard();
    let calls = CallCounter::default();

    fetch_counted(&guard, &calls, false).await;
    guard.invalidate();
    assert_eq!(guard.cached(), None);

    fetch_counted(&guard, &calls, false).await;
    assert_eq!(calls.get(), 2);
}
