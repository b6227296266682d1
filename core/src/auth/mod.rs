//! Token-based authentication
//!
//! - [`TokenStore`]: persistence for the session token
//! - [`AuthSession`]: in-memory [`AuthState`] plus token refresh
//! - [`ProfileCacheGuard`]: single-flight cached profile fetches
//! - [`AuthService`]: login, logout, restore and permission checks

pub mod error;
pub mod profile_cache;
pub mod service;
pub mod session;
pub mod token_store;

pub use error::AuthError;
pub use profile_cache::{CacheEntry, DEFAULT_PROFILE_TTL, ProfileCacheGuard, ProfileFetchError};
pub use service::AuthService;
pub use session::AuthSession;
pub use token_store::{
    DEFAULT_TOKEN_LIFETIME, FileTokenStore, MemoryTokenStore, StoredToken, TokenStore,
    TokenStoreError,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub login: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// `{ success, data }` wrapper used by most endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: T,
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub data: LoginData,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub profil_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileData {
    pub user: UserProfile,
}

pub type ProfileResponse = ApiEnvelope<ProfileData>;

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshData {
    pub token: String,
}

pub type RefreshResponse = ApiEnvelope<RefreshData>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profil: Option<Profil>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.nom.as_deref().unwrap_or(&self.login)
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.libelle.clone()).collect()
    }
}

/// Role assigned to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profil {
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub libelle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub id: String,
    pub libelle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub permissions: Vec<Permission>,
    pub error: Option<String>,
}

impl AuthState {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p.libelle == permission)
    }
}
