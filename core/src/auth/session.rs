//! Current authentication session.
//!
//! [`AuthSession`] owns the in-memory [`AuthState`] and the profile cache,
//! and mirrors the token into a [`TokenStore`]. It is the [`TokenProvider`]
//! behind the authenticated [`ApiClient`], so a 401 lands here as a refresh
//! request. Clearing the session always drops the cached profile.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use super::profile_cache::{DEFAULT_PROFILE_TTL, ProfileCacheGuard};
use super::token_store::{StoredToken, TokenStore};
use super::{AuthError, AuthState, LoginResponse, RefreshResponse, UserProfile};
use crate::api_client::{ApiClient, ApiError, ApiResult, TokenProvider};

const REFRESH_ENDPOINT: &str = "/auth/refresh";

pub struct AuthSession {
    store: Arc<dyn TokenStore>,
    state: RwLock<AuthState>,
    profiles: ProfileCacheGuard<UserProfile, AuthError>,
    /// Unauthenticated client used for the refresh call itself.
    refresher: ApiClient,
    token_lifetime: Duration,
}

impl AuthSession {
    pub fn new(store: Arc<dyn TokenStore>, refresher: ApiClient, token_lifetime: Duration) -> Self {
        Self {
            store,
            state: RwLock::new(AuthState::default()),
            profiles: ProfileCacheGuard::new(DEFAULT_PROFILE_TTL),
            refresher,
            token_lifetime,
        }
    }

    pub fn with_profile_ttl(mut self, ttl: Duration) -> Self {
        self.profiles = ProfileCacheGuard::new(ttl);
        self
    }

    pub fn profiles(&self) -> &ProfileCacheGuard<UserProfile, AuthError> {
        &self.profiles
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.state.read().await.user.clone()
    }

    /// Persist and activate the session from a successful login.
    pub async fn begin(&self, response: &LoginResponse) -> Result<(), AuthError> {
        let record = StoredToken::new(
            response.data.token.clone(),
            response.refresh_token.clone().unwrap_or_default(),
            response.data.user.id.clone(),
            response.data.user.login.clone(),
            self.token_lifetime,
        );
        self.store.store(&record)?;

        let mut state = self.state.write().await;
        *state = AuthState {
            user: None,
            token: Some(record.token),
            is_authenticated: true,
            permissions: Vec::new(),
            error: None,
        };
        tracing::info!(user = %response.data.user.login, "session started");
        Ok(())
    }

    /// Activate the session stored by a previous run, if any.
    pub async fn restore(&self) -> Result<Option<StoredToken>, AuthError> {
        let Some(record) = self.store.load()? else {
            return Ok(None);
        };

        let mut state = self.state.write().await;
        state.token = Some(record.token.clone());
        state.is_authenticated = true;
        state.error = None;
        tracing::debug!(user = %record.username, "session restored from store");
        Ok(Some(record))
    }

    /// Record the fetched profile and sync its permissions to the store.
    pub async fn set_profile(&self, profile: UserProfile) -> Result<(), AuthError> {
        if let Some(mut record) = self.store.load()? {
            record.user_id = profile.id.clone();
            record.username = profile.login.clone();
            record.permissions = profile.permission_names();
            self.store.store(&record)?;
        }

        let mut state = self.state.write().await;
        state.permissions = profile.permissions.clone();
        state.user = Some(profile);
        state.error = None;
        Ok(())
    }

    pub async fn set_error(&self, message: impl Into<String>) {
        self.state.write().await.error = Some(message.into());
    }

    /// Drop the session locally.
    ///
    /// The in-memory state and profile cache are always cleared; the store
    /// error, if any, is returned afterwards.
    pub async fn clear(&self) -> Result<(), AuthError> {
        self.profiles.invalidate();
        *self.state.write().await = AuthState::default();
        self.store.clear()?;
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for AuthSession {
    async fn access_token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    async fn refresh(&self) -> ApiResult<String> {
        let record = self
            .store
            .load()
            .map_err(|e| {
                tracing::warn!(error = %e, "cannot read token store for refresh");
                ApiError::AuthRequired
            })?
            .filter(|record| !record.refresh_token.is_empty())
            .ok_or(ApiError::AuthRequired)?;

        let response: RefreshResponse = self
            .refresher
            .post(REFRESH_ENDPOINT, &json!({ "refreshToken": record.refresh_token }))
            .await?;
        if !response.success {
            return Err(ApiError::AuthRequired);
        }

        let renewed = record.renewed(response.data.token, self.token_lifetime);
        if let Err(e) = self.store.store(&renewed) {
            tracing::warn!(error = %e, "failed to persist refreshed token");
        }
        self.state.write().await.token = Some(renewed.token.clone());
        tracing::debug!("access token refreshed");
        Ok(renewed.token)
    }

    async fn on_auth_lost(&self) {
        tracing::info!("session rejected by server, logging out");
        if let Err(e) = self.clear().await {
            tracing::warn!(error = %e, "failed to clear token store");
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token_lifetime", &self.token_lifetime)
            .finish_non_exhaustive()
    }
}
