//! Health probe against the API's database-check endpoint.
//!
//! A probe is one bounded request. It never touches shared state; the
//! [`ConnectionRegister`](crate::status::ConnectionRegister) records the
//! outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;

use crate::config::AppConfig;

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub latency: Duration,
    pub message: Option<String>,
}

impl ProbeOutcome {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency,
            message: None,
        }
    }

    pub fn unhealthy(latency: Duration, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency,
            message: Some(message.into()),
        }
    }
}

/// Body returned by `/db-check` and `/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl HealthResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// Probe that issues `GET <health_url>` with a per-request timeout.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.api.health_url(),
            config.connectivity.probe_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> ProbeOutcome {
        let start = Instant::now();
        let response = self.client.get(&self.url).timeout(self.timeout).send().await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ProbeOutcome::unhealthy(
                    start.elapsed(),
                    format!("Health check timed out after {:?}", self.timeout),
                );
            }
            Err(e) => return ProbeOutcome::unhealthy(start.elapsed(), e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return ProbeOutcome::unhealthy(
                start.elapsed(),
                format!("Health check failed: {status}"),
            );
        }

        let body = response.json::<HealthResponse>().await;
        let latency = start.elapsed();
        match body {
            Ok(body) if body.is_success() => ProbeOutcome {
                healthy: true,
                latency,
                message: body.message,
            },
            Ok(body) => ProbeOutcome::unhealthy(
                latency,
                body.message
                    .unwrap_or_else(|| format!("Health status '{}'", body.status)),
            ),
            Err(e) => ProbeOutcome::unhealthy(latency, format!("Invalid health response: {e}")),
        }
    }
}
