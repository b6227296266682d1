use std::time::Duration;

use pretty_assertions::assert_eq;
use successfuel_core::{BackoffPolicy, ConnectivityMonitor, RetryEngine};

use super::common::{ScriptedProbe, healthy, refused, register_with};

#[tokio::test(start_paused = true)]
async fn monitor_checks_once_per_interval() {
    let probe = ScriptedProbe::always(healthy(30));
    let register = register_with(probe.clone());
    let monitor = ConnectivityMonitor::start(register.clone(), Some(Duration::from_secs(10)));
    assert!(monitor.is_running());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probe.calls(), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.calls(), 3);
    assert!(register.is_connected());

    monitor.stop();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn dropping_monitor_stops_it() {
    let probe = ScriptedProbe::always(refused());
    let register = register_with(probe.clone());

    {
        let _monitor = ConnectivityMonitor::start(register.clone(), Some(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
    }
    let seen = probe.calls();
    assert_eq!(seen, 2);
    assert_eq!(register.status().retry_count, 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(probe.calls(), seen);
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_check_leaves_register_retryable() {
    let probe = ScriptedProbe::slow(healthy(5), Duration::from_secs(3));
    let register = register_with(probe.clone());
    let monitor = ConnectivityMonitor::start(register.clone(), Some(Duration::from_secs(1)));

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(register.status().is_checking);

    monitor.shutdown().await;
    let status = register.status();
    assert!(!status.is_checking);
    assert!(!status.is_busy());

    let engine = RetryEngine::new(register.clone(), BackoffPolicy::default());
    let retried = engine.immediate_retry().await;
    assert!(retried.is_some_and(|s| s.is_connected));
    assert_eq!(probe.calls(), 2);
}
