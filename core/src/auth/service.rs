//! Login, logout, session restore and permission checks.

use std::sync::Arc;

use super::profile_cache::ProfileFetchError;
use super::session::AuthSession;
use super::token_store::TokenStore;
use super::{AuthError, AuthState, LoginCredentials, LoginResponse, ProfileResponse, UserProfile};
use crate::api_client::{ApiClient, ApiResult};
use crate::config::AppConfig;
use crate::coordinator::RequestCoordinator;

const LOGIN_ENDPOINT: &str = "/auth/login";
const LOGOUT_ENDPOINT: &str = "/auth/logout";
const PROFILE_ENDPOINT: &str = "/auth/profile";

pub struct AuthService {
    api: ApiClient,
    /// No bearer token and no refresh policy. Used for login.
    anonymous: ApiClient,
    session: Arc<AuthSession>,
    coordinator: Option<RequestCoordinator>,
}

impl AuthService {
    pub fn new(http: reqwest::Client, config: &AppConfig, store: Arc<dyn TokenStore>) -> Self {
        let base_url = config.api.base_url.clone();
        let token_lifetime = std::time::Duration::from_secs(config.auth.token_lifetime_secs);
        let anonymous = ApiClient::new(http, base_url);
        let session = Arc::new(
            AuthSession::new(store, anonymous.clone(), token_lifetime)
                .with_profile_ttl(config.auth.profile_cache_ttl()),
        );
        let api = anonymous.clone().with_token_provider(session.clone());

        Self {
            api,
            anonymous,
            session,
            coordinator: None,
        }
    }

    /// Route API calls through `coordinator` so they wait for connectivity
    /// and retry network failures.
    pub fn with_coordinator(mut self, coordinator: RequestCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<UserProfile, AuthError> {
        tracing::info!(login = %credentials.login, "logging in");
        match self.try_login(credentials).await {
            Ok(profile) => {
                tracing::info!(user = %profile.login, "login complete");
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, "login failed");
                self.session.set_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn try_login(&self, credentials: &LoginCredentials) -> Result<UserProfile, AuthError> {
        let api = &self.anonymous;
        let response: LoginResponse = self
            .call(|| api.post(LOGIN_ENDPOINT, credentials))
            .await?;
        if !response.success {
            return Err(AuthError::LoginRejected("Invalid credentials".to_string()));
        }

        self.session.begin(&response).await?;
        Ok(self.get_profile(true).await?)
    }

    /// End the session locally, telling the server on a best-effort basis.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if self.session.is_authenticated().await {
            let result: ApiResult<serde_json::Value> =
                self.api.post(LOGOUT_ENDPOINT, &serde_json::json!({})).await;
            if let Err(e) = result {
                tracing::debug!(error = %e, "server logout failed, clearing locally");
            }
        }

        self.session.clear().await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Restore the stored session and load its profile.
    ///
    /// Any failure drops the session locally. Returns whether a session is
    /// active afterwards.
    pub async fn initialize(&self) -> bool {
        match self.session.restore().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!("no stored session");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored session");
                return false;
            }
        }

        match self.get_profile(false).await {
            Ok(profile) => {
                tracing::info!(user = %profile.login, "session restored");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored session is unusable, clearing it");
                if let Err(e) = self.session.clear().await {
                    tracing::warn!(error = %e, "failed to clear token store");
                }
                false
            }
        }
    }

    /// Profile of the current user, served from cache when fresh.
    pub async fn get_profile(
        &self,
        force_refresh: bool,
    ) -> Result<UserProfile, ProfileFetchError<AuthError>> {
        let api = self.api.clone();
        let session = Arc::clone(&self.session);
        let coordinator = self.coordinator.clone();

        let result = self
            .session
            .profiles()
            .fetch(force_refresh, move || async move {
                let response: ProfileResponse = match &coordinator {
                    Some(coordinator) => {
                        coordinator
                            .execute(|| api.get(PROFILE_ENDPOINT, &[]))
                            .await?
                    }
                    None => api.get(PROFILE_ENDPOINT, &[]).await?,
                };
                if !response.success {
                    return Err(AuthError::InvalidProfile(
                        "Failed to fetch user profile".to_string(),
                    ));
                }

                let profile = response.data.user;
                if profile.id.is_empty() {
                    return Err(AuthError::InvalidProfile(
                        "Invalid user profile data received".to_string(),
                    ));
                }
                session.set_profile(profile.clone()).await?;
                Ok::<_, AuthError>(profile)
            })
            .await;

        if let Err(e) = &result {
            self.session.set_error(e.to_string()).await;
        }
        result
    }

    pub fn clear_profile_cache(&self) {
        self.session.profiles().invalidate();
    }

    pub async fn state(&self) -> AuthState {
        self.session.state().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.session.current_user().await
    }

    pub async fn has_permission(&self, permission: &str) -> bool {
        self.session.state().await.has_permission(permission)
    }

    pub async fn has_any_permission(&self, permissions: &[&str]) -> bool {
        let state = self.session.state().await;
        permissions.iter().any(|p| state.has_permission(p))
    }

    pub async fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        let state = self.session.state().await;
        permissions.iter().all(|p| state.has_permission(p))
    }

    async fn call<F, Fut, T>(&self, mut operation: F) -> Result<T, AuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        match &self.coordinator {
            Some(coordinator) => Ok(coordinator.execute(operation).await?),
            None => Ok(operation().await?),
        }
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("api", &self.api)
            .field("session", &self.session)
            .field("coordinated", &self.coordinator.is_some())
            .finish()
    }
}
