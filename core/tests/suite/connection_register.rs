use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use successfuel_core::{ConnectionRegister, ConnectionStatus, HttpHealthProbe, Stability};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{ScriptedProbe, healthy, refused, register_with};

#[tokio::test]
async fn fifty_ms_probe_is_connected_and_stable() {
    let register = register_with(ScriptedProbe::always(healthy(50)));

    let status = register.check_connection().await;

    assert!(status.is_connected);
    assert_eq!(status.stability, Stability::Stable);
    assert_eq!(status.retry_count, 0);
    assert_eq!(status.latency_ms, Some(50));
}

#[tokio::test]
async fn failures_increment_by_one_and_success_resets() {
    let probe = ScriptedProbe::new([refused(), refused(), refused()], healthy(20));
    let register = register_with(probe);

    for expected in 1..=3 {
        assert_eq!(register.check_connection().await.retry_count, expected);
    }

    let status = register.check_connection().await;
    assert!(status.is_connected);
    assert_eq!(status.retry_count, 0);
}

#[tokio::test]
async fn three_timeouts_leave_register_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db-check"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "success"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let probe = HttpHealthProbe::new(
        reqwest::Client::new(),
        format!("{}/db-check", server.uri()),
        Duration::from_millis(50),
    );
    let register = ConnectionRegister::new(Arc::new(probe));

    for expected in 1..=3 {
        let status = register.check_connection().await;
        assert_eq!(status.retry_count, expected);
        assert!(!status.is_connected);
        assert_eq!(status.stability, Stability::Offline);
        assert!(
            status.error.as_deref().unwrap_or_default().contains("timed out"),
            "{status:?}"
        );
    }
}

#[tokio::test]
async fn http_probe_against_healthy_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/db-check"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "success", "message": "Database connection successful"}))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let probe = HttpHealthProbe::new(
        reqwest::Client::new(),
        format!("{}/db-check", server.uri()),
        Duration::from_secs(5),
    );
    let register = ConnectionRegister::new(Arc::new(probe));

    let status = register.check_connection().await;
    assert!(status.is_connected);
    assert_eq!(status.retry_count, 0);
    assert!(status.latency_ms.is_some_and(|ms| ms >= 50));
}

#[tokio::test]
async fn subscribers_see_each_write_after_registration() {
    let register = register_with(ScriptedProbe::new([refused()], healthy(10)));
    let seen: Arc<Mutex<Vec<ConnectionStatus>>> = Arc::default();

    let subscription = {
        let seen = Arc::clone(&seen);
        register.subscribe(move |status| seen.lock().unwrap().push(status.clone()))
    };
    assert!(seen.lock().unwrap().is_empty());

    register.check_connection().await;
    register.check_connection().await;
    subscription.unsubscribe();
    register.reset();

    let seen = seen.lock().unwrap();
    let flags: Vec<(bool, bool, u32)> = seen
        .iter()
        .map(|s| (s.is_checking, s.is_connected, s.retry_count))
        .collect();
    assert_eq!(
        flags,
        vec![
            (true, false, 0),
            (false, false, 1),
            (true, false, 1),
            (false, true, 0),
        ]
    );
}

#[test]
fn stability_covers_every_latency_band() {
    let threshold = Duration::from_millis(200);
    for (connected, latency, expected) in [
        (false, 0, Stability::Offline),
        (false, 900, Stability::Offline),
        (true, 0, Stability::Stable),
        (true, 199, Stability::Stable),
        (true, 200, Stability::Unstable),
        (true, 10_000, Stability::Unstable),
    ] {
        assert_eq!(
            Stability::classify(connected, Some(Duration::from_millis(latency)), threshold),
            expected,
            "connected={connected} latency={latency}"
        );
    }
}
