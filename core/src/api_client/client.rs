use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ApiError, ApiResult, error_message};
use crate::config::loader::join_url;

/// Source of bearer tokens for [`ApiClient`].
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, if a session exists.
    async fn access_token(&self) -> Option<String>;

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self) -> ApiResult<String>;

    /// Called once the server keeps rejecting the session.
    async fn on_auth_lost(&self);
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl ApiClient {
    /// Client without authentication.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens: None,
        }
    }

    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> ApiResult<T> {
        self.request(Method::GET, endpoint, query, None).await
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.request(Method::POST, endpoint, &[], Some(body)).await
    }

    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.request(Method::PUT, endpoint, &[], Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(Method::DELETE, endpoint, &[], None).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> ApiResult<T> {
        let url = self.url(endpoint);
        let token = match &self.tokens {
            Some(tokens) => tokens.access_token().await,
            None => None,
        };

        let response = self
            .send(method.clone(), &url, query, body.as_ref(), token.as_deref())
            .await?;

        let response = match (&self.tokens, response.status()) {
            (Some(tokens), StatusCode::UNAUTHORIZED) => {
                tracing::debug!(%url, "401 received, refreshing token");
                let refreshed = match tokens.refresh().await {
                    Ok(token) => token,
                    Err(e) if e.is_auth_rejection() => {
                        tracing::warn!(error = %e, "token refresh rejected");
                        tokens.on_auth_lost().await;
                        return Err(ApiError::AuthRequired);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "token refresh failed, keeping session");
                        return Err(e);
                    }
                };

                let retried = self
                    .send(method, &url, query, body.as_ref(), Some(&refreshed))
                    .await?;
                if retried.status() == StatusCode::UNAUTHORIZED {
                    tracing::warn!(%url, "still unauthorized after refresh");
                    tokens.on_auth_lost().await;
                    return Err(ApiError::AuthRequired);
                }
                retried
            }
            _ => response,
        };

        decode(response).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> ApiResult<reqwest::Response> {
        let mut request = self.http.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.tokens.is_some())
            .finish()
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> ApiResult<Value> {
    serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(status, &text),
        });
    }

    // 204 and other empty bodies decode as JSON null
    let text = if text.trim().is_empty() { "null" } else { &text };
    serde_json::from_str(text).map_err(|e| ApiError::Parse(e.to_string()))
}
