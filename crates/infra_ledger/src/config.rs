//! Ledger connection configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Consent page
pub const AUTHORIZATION_ENDPOINT: &str = "https://appcenter.intuit.com/connect/oauth2";

/// Code exchange and refresh endpoint
pub const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// Scopes requested at consent
pub const SCOPES: &str = "com.intuit.quickbooks.accounting openid";

/// Target ledger environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl LedgerEnvironment {
    /// Accounting API base URL
    pub fn api_base_url(&self) -> &'static str {
        match self {
            LedgerEnvironment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            LedgerEnvironment::Production => "https://quickbooks.api.intuit.com",
        }
    }
}

impl fmt::Display for LedgerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEnvironment::Sandbox => f.write_str("sandbox"),
            LedgerEnvironment::Production => f.write_str("production"),
        }
    }
}

impl FromStr for LedgerEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(LedgerEnvironment::Sandbox),
            "production" => Ok(LedgerEnvironment::Production),
            other => Err(format!("unknown ledger environment: {other}")),
        }
    }
}

/// Configuration for the ledger adapters
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub environment: LedgerEnvironment,
    /// Timeout applied to every outbound HTTP call
    pub request_timeout: Duration,
    /// Overrides the environment's API base URL
    pub api_base_url: Option<String>,
    /// Overrides the token endpoint
    pub token_url: Option<String>,
    /// Accounting API minor version
    pub minor_version: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8080/ledger/callback".to_string(),
            environment: LedgerEnvironment::default(),
            request_timeout: Duration::from_secs(30),
            api_base_url: None,
            token_url: None,
            minor_version: 70,
        }
    }
}

impl LedgerConfig {
    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.api_base_url())
    }

    pub fn token_url(&self) -> &str {
        self.token_url.as_deref().unwrap_or(TOKEN_ENDPOINT)
    }

    /// True when client credentials have been provided
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_urls() {
        assert!(LedgerEnvironment::Sandbox.api_base_url().contains("sandbox"));
        assert_eq!("PRODUCTION".parse::<LedgerEnvironment>().unwrap(), LedgerEnvironment::Production);

        let config = LedgerConfig {
            api_base_url: Some("http://127.0.0.1:9000".to_string()),
            ..Default::default()
        };
        assert_eq!(config.api_base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.token_url(), TOKEN_ENDPOINT);
        assert!(!config.is_configured());
    }
}
