use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use successfuel_core::ApiError;
use successfuel_core::auth::{
    AuthService, FileTokenStore, LoginCredentials, MemoryTokenStore, StoredToken, TokenStore,
};
use successfuel_core::config::AppConfig;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.api.base_url = format!("{}/api/v1", server.uri());
    config.api.root_url = server.uri();
    config
}

fn profile_body() -> Value {
    json!({
        "success": true,
        "data": {
            "user": {
                "id": "u1",
                "login": "gerant",
                "nom": "Awa Diop",
                "email": "awa@example.com",
                "profil": {"id": "p1", "code": "GERANT", "libelle": "Gérant"},
                "permissions": [
                    {"id": "1", "libelle": "VENTES_LIRE"},
                    {"id": "2", "libelle": "STOCK_GERER"}
                ]
            }
        }
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({"login": "gerant", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"token": "old", "user": {"id": "u1", "login": "gerant", "profil_id": "p1", "stations_user": []}},
            "refresh_token": "refresh-1"
        })))
        .mount(server)
        .await;
}

fn stored(token: &str) -> StoredToken {
    StoredToken::new(
        token,
        "refresh-1",
        "u1",
        "gerant",
        std::time::Duration::from_secs(1800),
    )
}

#[tokio::test]
async fn login_loads_profile_and_persists_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let store = Arc::new(FileTokenStore::new(dir.path()));
    let service = AuthService::new(reqwest::Client::new(), &config_for(&server), store.clone());

    let profile = service
        .login(&LoginCredentials::new("gerant", "secret"))
        .await?;

    assert_eq!(profile.display_name(), "Awa Diop");
    assert!(service.is_authenticated().await);
    assert!(service.has_permission("VENTES_LIRE").await);
    assert!(service.has_any_permission(&["NOPE", "STOCK_GERER"]).await);
    assert!(!service.has_all_permissions(&["VENTES_LIRE", "NOPE"]).await);

    let record = store.load()?.expect("token persisted");
    assert_eq!(record.token, "old");
    assert_eq!(record.refresh_token, "refresh-1");
    assert_eq!(record.permissions, vec!["VENTES_LIRE", "STOCK_GERER"]);

    // served from cache
    let again = service.get_profile(false).await?;
    assert_eq!(again, profile);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_refreshed_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"token": "new"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::default());
    store.store(&stored("old"))?;
    let service = AuthService::new(reqwest::Client::new(), &config_for(&server), store.clone());

    assert!(service.initialize().await);
    assert_eq!(
        service.current_user().await.map(|u| u.login).as_deref(),
        Some("gerant")
    );
    assert_eq!(store.load()?.map(|r| r.token).as_deref(), Some("new"));
    Ok(())
}

#[tokio::test]
async fn persistent_401_logs_out_without_retrying() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"token": "new"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::default());
    store.store(&stored("old"))?;
    let service = AuthService::new(reqwest::Client::new(), &config_for(&server), store.clone());
    service.session().restore().await?;

    let err = service
        .get_profile(false)
        .await
        .expect_err("profile must fail");
    assert!(matches!(
        err.inner(),
        Some(successfuel_core::auth::AuthError::Api(ApiError::AuthRequired))
    ));
    assert!(!service.is_authenticated().await);
    assert_eq!(store.load()?, None);
    Ok(())
}

#[tokio::test]
async fn initialize_without_stored_token_stays_logged_out() {
    let server = MockServer::start().await;
    let service = AuthService::new(
        reqwest::Client::new(),
        &config_for(&server),
        Arc::new(MemoryTokenStore::default()),
    );

    assert!(!service.initialize().await);
    assert!(!service.is_authenticated().await);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn logout_clears_store_and_profile_cache() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": null})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::default());
    let service = AuthService::new(reqwest::Client::new(), &config_for(&server), store.clone());
    service
        .login(&LoginCredentials::new("gerant", "secret"))
        .await?;

    service.logout().await?;
    assert!(!service.is_authenticated().await);
    assert_eq!(store.load()?, None);

    // cache was dropped, so this goes back to the network
    store.store(&stored("old"))?;
    service.session().restore().await?;
    service.get_profile(false).await?;
    Ok(())
}

#[tokio::test]
async fn rejected_password_is_a_status_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let service = AuthService::new(
        reqwest::Client::new(),
        &config_for(&server),
        Arc::new(MemoryTokenStore::default()),
    );
    let err = service
        .login(&LoginCredentials::new("gerant", "wrong"))
        .await
        .expect_err("login must fail");

    assert!(matches!(
        err,
        successfuel_core::auth::AuthError::Api(ApiError::Status { status: 401, .. })
    ));
    let state = service.state().await;
    assert!(!state.is_authenticated);
    assert_eq!(
        state.error.as_deref(),
        Some("API request failed (401): Invalid credentials")
    );
    Ok(())
}

#[tokio::test]
async fn rejected_session_drops_cached_profile() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/stations"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"token": "new"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::default());
    let service = AuthService::new(reqwest::Client::new(), &config_for(&server), store.clone());
    service
        .login(&LoginCredentials::new("gerant", "secret"))
        .await?;
    assert!(service.session().profiles().cached().is_some());

    let result = service.api().get::<Value>("/stations", &[]).await;
    assert!(matches!(result, Err(ApiError::AuthRequired)));
    assert!(!service.is_authenticated().await);
    assert_eq!(store.load()?, None);
    assert_eq!(service.session().profiles().cached(), None);

    // nothing cached, and no token to send
    assert!(service.get_profile(false).await.is_err());
    Ok(())
}

#[tokio::test]
async fn unavailable_refresh_keeps_stored_session() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::default());
    store.store(&stored("old"))?;
    let service = AuthService::new(reqwest::Client::new(), &config_for(&server), store.clone());
    service.session().restore().await?;

    let err = service
        .get_profile(false)
        .await
        .expect_err("profile must fail");
    assert!(matches!(
        err.inner(),
        Some(successfuel_core::auth::AuthError::Api(ApiError::Status { status: 503, .. }))
    ));
    assert!(service.is_authenticated().await);
    assert_eq!(store.load()?.map(|r| r.token).as_deref(), Some("old"));
    Ok(())
}
