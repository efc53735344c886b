//! Ledger Infrastructure
//!
//! Adapters connecting the export domain to a QuickBooks-style accounting
//! API:
//!
//! - **TokenManager**: OAuth 2.0 consent, code exchange and single-flight
//!   token refresh, backed by a persistent [`TokenStore`]
//! - **QuickBooksLedgerClient**: the [`LedgerPort`](domain_export::LedgerPort)
//!   implementation; writes one bill per claimant batch with
//!   lookup-before-create on the batch key
//!
//! # Token Lifecycle
//!
//! ```text
//! authorization_url -> (user consents) -> complete_authorization
//!     -> access_token (refreshed within 60 s of expiry)
//!     -> ReauthorizationRequired once the refresh token is gone
//! ```

pub mod config;
pub mod token;
pub mod oauth;
pub mod manager;
pub mod client;

pub use config::{LedgerConfig, LedgerEnvironment};
pub use token::{FileTokenStore, InMemoryTokenStore, OAuthTokens, TokenStore};
pub use oauth::{HttpOAuthProvider, OAuthError, OAuthProvider, TokenResponse};
pub use manager::{AccessToken, TokenManager};
pub use client::{ConnectionStatus, QuickBooksLedgerClient};
