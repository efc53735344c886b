//! OAuth 2.0 authorization server client

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::LedgerConfig;

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token lifetime in seconds
    #[serde(default, rename = "x_refresh_token_expires_in")]
    pub refresh_token_expires_in: Option<i64>,
}

/// Authorization server failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthError {
    /// The grant was refused (invalid, expired or revoked)
    #[error("grant rejected: {0}")]
    Rejected(String),

    /// The server could not be reached or answered with a server error
    #[error("authorization server unreachable: {0}")]
    Unavailable(String),
}

/// Grants against the authorization server
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchanges an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError>;

    /// Obtains a new token set from a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError>;
}

/// OAuth provider speaking to the token endpoint over HTTP
#[derive(Debug, Clone)]
pub struct HttpOAuthProvider {
    http: reqwest::Client,
    config: LedgerConfig,
}

impl HttpOAuthProvider {
    pub fn new(config: LedgerConfig) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OAuthError::Unavailable(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn grant(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(self.config.token_url())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| OAuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| OAuthError::Unavailable(format!("malformed token response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Token endpoint refused grant");
        if status.is_client_error() {
            Err(OAuthError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)))
        } else {
            Err(OAuthError::Unavailable(format!("HTTP {}", status.as_u16())))
        }
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        self.grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        self.grant(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
    }
}
