//! API configuration
//!
//! Every field can be set from an `API_`-prefixed environment variable,
//! e.g. `API_PORT=9000` or `API_LEDGER_CLIENT_ID=...`; unset fields keep
//! their defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use domain_expense::{ApprovalConfig, EmptyTeamPolicy, PolicyConfig};
use domain_export::{ReconcilerConfig, DEFAULT_SYNC_INTERVAL};
use infra_ledger::{LedgerConfig, LedgerEnvironment};

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Amounts strictly above this are flagged on submission
    pub policy_max_amount: Decimal,
    /// What a manager without declared reports sees in the pending list
    pub empty_team_policy: EmptyTeamPolicy,
    /// Seconds between background reconciliation passes
    pub sync_interval_secs: u64,
    /// Upper bound on a single ledger write, in seconds
    pub ledger_write_timeout_secs: u64,
    pub ledger_client_id: String,
    pub ledger_client_secret: String,
    pub ledger_redirect_uri: String,
    /// `sandbox` or `production`
    pub ledger_environment: String,
    /// Overrides the environment's API base URL
    pub ledger_api_base_url: Option<String>,
    /// Where OAuth tokens are persisted
    pub ledger_token_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/expenses".to_string(),
            log_level: "info".to_string(),
            policy_max_amount: dec!(1000),
            empty_team_policy: EmptyTeamPolicy::default(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL.as_secs(),
            ledger_write_timeout_secs: 30,
            ledger_client_id: String::new(),
            ledger_client_secret: String::new(),
            ledger_redirect_uri: "http://localhost:8080/ledger/callback".to_string(),
            ledger_environment: "sandbox".to_string(),
            ledger_api_base_url: None,
            ledger_token_path: "data/ledger_tokens.json".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            max_amount: self.policy_max_amount,
        }
    }

    pub fn approval_config(&self) -> ApprovalConfig {
        ApprovalConfig {
            empty_team_policy: self.empty_team_policy,
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            write_timeout: Duration::from_secs(self.ledger_write_timeout_secs),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    /// Builds the ledger adapter configuration
    pub fn ledger_config(&self) -> Result<LedgerConfig, config::ConfigError> {
        let environment = self
            .ledger_environment
            .parse::<LedgerEnvironment>()
            .map_err(config::ConfigError::Message)?;

        Ok(LedgerConfig {
            client_id: self.ledger_client_id.clone(),
            client_secret: self.ledger_client_secret.clone(),
            redirect_uri: self.ledger_redirect_uri.clone(),
            environment,
            request_timeout: Duration::from_secs(self.ledger_write_timeout_secs),
            api_base_url: self.ledger_api_base_url.clone(),
            ..LedgerConfig::default()
        })
    }
}
