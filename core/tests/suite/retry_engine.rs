use std::time::Duration;

use pretty_assertions::assert_eq;
use successfuel_core::BackoffPolicy;
use successfuel_core::RetryEngine;
use successfuel_core::config::ConnectivityConfig;

use super::common::{ScriptedProbe, healthy, refused, register_with};

#[test]
fn backoff_delays_follow_capped_doubling() {
    let policy = BackoffPolicy::from_config(&ConnectivityConfig::default());
    assert_eq!(policy.delay(0), Duration::from_millis(1_000));
    assert_eq!(policy.delay(1), Duration::from_millis(2_000));
    assert_eq!(policy.delay(5), Duration::from_millis(30_000));
}

#[tokio::test(start_paused = true)]
async fn check_with_retry_sleeps_between_failures() {
    let probe = ScriptedProbe::new([refused(), refused(), refused()], healthy(40));
    let engine = RetryEngine::new(register_with(probe.clone()), BackoffPolicy::default());

    let start = tokio::time::Instant::now();
    let status = engine.check_connection_with_retry(3).await;

    assert!(status.is_connected);
    assert_eq!(probe.calls(), 4);
    // 1s + 2s + 4s
    assert_eq!(start.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn overlapping_immediate_retries_run_one_check() {
    let probe = ScriptedProbe::always(healthy(10));
    let engine = RetryEngine::new(register_with(probe.clone()), BackoffPolicy::default());

    let (first, second) = tokio::join!(engine.immediate_retry(), engine.immediate_retry());

    assert_eq!(probe.calls(), 1);
    assert!(first.is_some() != second.is_some());
    assert!(engine.register().is_connected());
}
