//! OAuth token set and its persistence

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

use core_kernel::PortError;

/// Tokens obtained from the authorization server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    /// Company the consent was granted for
    pub realm_id: Option<String>,
}

impl OAuthTokens {
    /// True when the access token expires within `skew` of `now`
    pub fn access_expires_within(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        self.access_expires_at - skew <= now
    }

    /// The refresh token, if it is still usable at `now`
    pub fn usable_refresh_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (self.refresh_token.as_deref(), self.refresh_expires_at) {
            (Some(token), Some(expires)) if expires > now => Some(token),
            (Some(token), None) => Some(token),
            _ => None,
        }
    }
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("realm_id", &self.realm_id)
            .finish()
    }
}

/// Persistence for the token set
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<OAuthTokens>, PortError>;
    async fn save(&self, tokens: &OAuthTokens) -> Result<(), PortError>;
    async fn clear(&self) -> Result<(), PortError>;
}

/// Token store backed by a JSON file
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash never leaves a truncated token file behind.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<OAuthTokens>, PortError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PortError::internal(format!("failed to read token file: {e}"))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PortError::internal(format!("corrupt token file: {e}")))
    }

    async fn save(&self, tokens: &OAuthTokens) -> Result<(), PortError> {
        let json = serde_json::to_vec_pretty(tokens)
            .map_err(|e| PortError::internal(format!("failed to encode tokens: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::internal(format!("failed to create token directory: {e}")))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| PortError::internal(format!("failed to write token file: {e}")))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| PortError::internal(format!("failed to replace token file: {e}")))
    }

    async fn clear(&self) -> Result<(), PortError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::internal(format!("failed to remove token file: {e}"))),
        }
    }
}

/// Token store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Option<OAuthTokens>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: OAuthTokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<OAuthTokens>, PortError> {
        Ok(self.tokens.read().await.clone())
    }

    async fn save(&self, tokens: &OAuthTokens) -> Result<(), PortError> {
        *self.tokens.write().await = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), PortError> {
        *self.tokens.write().await = None;
        Ok(())
    }
}
