//! Secure storage for the session token.
//!
//! Holds one [`StoredToken`] record. Expired records are treated as absent
//! and removed on load.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the token record inside the data directory.
pub const TOKEN_FILE: &str = "token.json";

/// Default session lifetime.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TokenStoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Unix seconds.
    pub expires_at: u64,
}

impl StoredToken {
    pub fn new(
        token: impl Into<String>,
        refresh_token: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        Self {
            token: token.into(),
            refresh_token: refresh_token.into(),
            user_id: user_id.into(),
            username: username.into(),
            permissions: Vec::new(),
            expires_at: now_secs().saturating_add(lifetime.as_secs()),
        }
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expires_at < now_secs
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    /// Same session with a new access token and a fresh lifetime.
    pub fn renewed(&self, token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: now_secs().saturating_add(lifetime.as_secs()),
            ..self.clone()
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn store(&self, token: &StoredToken) -> Result<()>;

    /// The stored record, or `None` when absent or expired.
    fn load(&self) -> Result<Option<StoredToken>>;

    fn clear(&self) -> Result<()>;
}

/// JSON file readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn store(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path)?;

        let json = serde_json::to_string_pretty(token)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredToken>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token: StoredToken = serde_json::from_str(&contents)?;
        if token.is_expired() {
            tracing::debug!(path = %self.path.display(), "removing expired token");
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(error = %e, "failed to remove expired token");
            }
            return Ok(None);
        }
        Ok(Some(token))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<StoredToken>>,
}

impl TokenStore for MemoryTokenStore {
    fn store(&self, token: &StoredToken) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredToken>> {
        let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(StoredToken::is_expired) {
            *slot = None;
        }
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
