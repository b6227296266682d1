use crate::config::error::{ConfigError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST endpoints and request limits
    #[serde(default)]
    pub api: ApiConfig,

    /// Health checks, backoff and the request coordinator
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Token storage and profile caching
    #[serde(default)]
    pub auth: AuthConfig,
}

/// REST API endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Versioned API base, e.g. `https://host/api/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Service root the health endpoint hangs off
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Health endpoint path relative to `root_url` (`/db-check` or `/health`)
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Per-request timeout for API calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Connectivity tracking and retry tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Interval between background health checks; 0 disables the monitor
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// First backoff step
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Bound on a single health probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// How long `execute` waits for a reconnect before giving up
    #[serde(default = "default_connection_wait_timeout_ms")]
    pub connection_wait_timeout_ms: u64,

    /// Attempts made by `execute` for network failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Latency under which a live connection counts as stable
    #[serde(default = "default_stable_latency_ms")]
    pub stable_latency_ms: u64,
}

/// Authentication storage and caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a cached user profile
    #[serde(default = "default_profile_cache_ttl_ms")]
    pub profile_cache_ttl_ms: u64,

    /// Lifetime stamped on newly stored tokens
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,

    /// Directory for the token file (defaults to the platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

// Default value functions
fn default_base_url() -> String {
    "https://successfuel-api.onrender.com/api/v1".to_string()
}
fn default_root_url() -> String {
    "https://successfuel-api.onrender.com".to_string()
}
fn default_health_path() -> String {
    "/db-check".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_check_interval_ms() -> u64 {
    10_000
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_max_retry_delay_ms() -> u64 {
    30_000
}
fn default_probe_timeout_ms() -> u64 {
    10_000
}
fn default_connection_wait_timeout_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_stable_latency_ms() -> u64 {
    200
}
fn default_profile_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}
fn default_token_lifetime_secs() -> u64 {
    30 * 60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            root_url: default_root_url(),
            health_path: default_health_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            connection_wait_timeout_ms: default_connection_wait_timeout_ms(),
            max_retries: default_max_retries(),
            stable_latency_ms: default_stable_latency_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            profile_cache_ttl_ms: default_profile_cache_ttl_ms(),
            token_lifetime_secs: default_token_lifetime_secs(),
            data_dir: None,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> String {
        join_url(&self.root_url, &self.health_path)
    }

    /// Full URL for an API endpoint such as `/auth/profile`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }
}

impl ConnectivityConfig {
    pub fn check_interval(&self) -> Option<Duration> {
        (self.check_interval_ms > 0).then(|| Duration::from_millis(self.check_interval_ms))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connection_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_wait_timeout_ms)
    }

    pub fn stable_latency(&self) -> Duration {
        Duration::from_millis(self.stable_latency_ms)
    }
}

impl AuthConfig {
    pub fn profile_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.profile_cache_ttl_ms)
    }

    /// Directory holding `token.json`.
    ///
    /// Falls back to `<data_dir>/successfuel`, then to `.successfuel` in the
    /// working directory when the platform has no data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("successfuel"))
            .unwrap_or_else(|| PathBuf::from(".successfuel"))
    }
}

impl AppConfig {
    /// Reject values that would make the retry machinery spin or stall.
    pub fn validate(&self) -> Result<()> {
        let zero_checks = [
            ("api.request_timeout_ms", self.api.request_timeout_ms),
            (
                "connectivity.retry_base_delay_ms",
                self.connectivity.retry_base_delay_ms,
            ),
            (
                "connectivity.probe_timeout_ms",
                self.connectivity.probe_timeout_ms,
            ),
            (
                "connectivity.connection_wait_timeout_ms",
                self.connectivity.connection_wait_timeout_ms,
            ),
            ("auth.profile_cache_ttl_ms", self.auth.profile_cache_ttl_ms),
        ];
        if let Some((field, _)) = zero_checks.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::invalid(*field, "must be greater than zero"));
        }

        if self.connectivity.max_retry_delay_ms < self.connectivity.retry_base_delay_ms {
            return Err(ConfigError::invalid(
                "connectivity.max_retry_delay_ms",
                format!(
                    "{} is below retry_base_delay_ms ({})",
                    self.connectivity.max_retry_delay_ms, self.connectivity.retry_base_delay_ms
                ),
            ));
        }

        for (field, url) in [
            ("api.base_url", &self.api.base_url),
            ("api.root_url", &self.api.root_url),
        ] {
            url::Url::parse(url).map_err(|e| ConfigError::invalid(field, format!("'{url}': {e}")))?;
        }

        Ok(())
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (SUCCESSFUEL_ prefix)
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&AppConfig::default())?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // Example: SUCCESSFUEL_CONNECTIVITY__MAX_RETRIES=5
        builder = builder.add_source(
            Environment::with_prefix("SUCCESSFUEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder.build()?.try_deserialize()?;
        app_config.validate()?;

        tracing::debug!(
            base_url = %app_config.api.base_url,
            health_url = %app_config.api.health_url(),
            "configuration loaded"
        );
        Ok(app_config)
    }

    /// Locate the default config file:
    /// 1. Current directory: ./successfuel.toml
    /// 2. Platform config dir: <config_dir>/successfuel/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./successfuel.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        dirs::config_dir()
            .map(|dir| dir.join("successfuel").join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<AppConfig> {
        match Self::find_config_file() {
            Some(path) => ConfigLoader::new().with_file(path).load(),
            None => ConfigLoader::new().load(),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
