//! REST client for the SuccessFuel API
//!
//! Thin JSON wrapper over `reqwest` with bearer auth and the one-refresh
//! policy for 401 responses.

mod client;

pub use client::{ApiClient, TokenProvider};

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::retry::{ErrorClass, RetryClassifiable, classify_message};

const USER_AGENT: &str = concat!("successfuel/", env!("CARGO_PKG_VERSION"));

/// Errors from API client operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure: DNS, connect, reset, timeout.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response other than a 401 that the auth policy handled.
    #[error("API request failed ({status}): {message}")]
    Status { status: u16, message: String },

    /// Still unauthorized after one token refresh. The session was dropped.
    #[error("Authentication required")]
    AuthRequired,

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::AuthRequired => Some(401),
            ApiError::Network(e) => e.status().as_ref().map(reqwest::StatusCode::as_u16),
            ApiError::Parse(_) => None,
        }
    }

    /// The server refused the credentials, as opposed to being unreachable.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::AuthRequired)
            || matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

impl RetryClassifiable for ApiError {
    fn classify(&self) -> ErrorClass {
        match self {
            ApiError::Network(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                ErrorClass::Network
            }
            // JSON decoding goes through `Parse`; these mean the transfer broke.
            ApiError::Network(e) if e.is_body() || e.is_decode() => ErrorClass::Network,
            ApiError::Network(e) => classify_message(&e.to_string()),
            ApiError::Status { .. } | ApiError::Parse(_) => ErrorClass::Application,
            ApiError::AuthRequired => ErrorClass::AuthRequired,
        }
    }
}

/// Result type for API client operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error body shapes the API returns.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Best human-readable message for a failed response body.
pub(crate) fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.is_empty())
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}

/// Build the shared HTTP client.
pub fn create_client(timeout: Duration) -> ApiResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}
