//! Authentication error types.

use thiserror::Error;

use super::profile_cache::ProfileFetchError;
use super::token_store::TokenStoreError;
use crate::api_client::ApiError;
use crate::coordinator::ExecuteError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Token store error: {0}")]
    Store(#[from] TokenStoreError),

    #[error("Login failed: {0}")]
    LoginRejected(String),

    #[error("{0}")]
    InvalidProfile(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("no connection available")]
    NoConnection,

    #[error(transparent)]
    Profile(#[from] ProfileFetchError<AuthError>),
}

impl From<ExecuteError<ApiError>> for AuthError {
    fn from(err: ExecuteError<ApiError>) -> Self {
        match err {
            ExecuteError::NoConnection => AuthError::NoConnection,
            ExecuteError::Network { error, attempts } => {
                tracing::debug!(attempts, "request failed after network retries");
                AuthError::Api(error)
            }
            ExecuteError::Application(error) => AuthError::Api(error),
        }
    }
}

impl AuthError {
    /// True when the server rejected the session for good.
    pub fn is_auth_required(&self) -> bool {
        match self {
            AuthError::Api(ApiError::AuthRequired) | AuthError::NotAuthenticated => true,
            AuthError::Profile(ProfileFetchError::Failed(inner)) => inner.is_auth_required(),
            _ => false,
        }
    }
}
