//! Token manager
//!
//! Owns the in-memory token set. Every access goes through one async mutex,
//! so concurrent callers that find the access token near expiry trigger a
//! single refresh and then share its result.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use core_kernel::PortError;
use domain_export::LedgerError;

use crate::config::{LedgerConfig, AUTHORIZATION_ENDPOINT, SCOPES};
use crate::oauth::{OAuthError, OAuthProvider, TokenResponse};
use crate::token::{OAuthTokens, TokenStore};

/// Refresh when the access token expires within this window
const REFRESH_SKEW_SECS: i64 = 60;

/// How long an issued consent `state` stays valid
const STATE_TTL_MINUTES: i64 = 10;

/// A usable bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub realm_id: Option<String>,
}

/// OAuth token lifecycle for the ledger connection
pub struct TokenManager {
    provider: Arc<dyn OAuthProvider>,
    store: Arc<dyn TokenStore>,
    config: LedgerConfig,
    tokens: Mutex<Option<OAuthTokens>>,
    pending_states: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TokenManager {
    /// Creates a manager, loading any persisted tokens
    pub async fn load(
        provider: Arc<dyn OAuthProvider>,
        store: Arc<dyn TokenStore>,
        config: LedgerConfig,
    ) -> Result<Self, PortError> {
        let tokens = store.load().await?;
        if let Some(ref t) = tokens {
            info!(realm_id = ?t.realm_id, "Loaded persisted ledger tokens");
        }
        Ok(Self {
            provider,
            store,
            config,
            tokens: Mutex::new(tokens),
            pending_states: Mutex::new(HashMap::new()),
        })
    }

    /// Builds the consent URL and remembers its `state` for the callback
    pub async fn authorization_url(&self) -> Result<String, LedgerError> {
        let state = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        {
            let mut pending = self.pending_states.lock().await;
            pending.retain(|_, issued| now - *issued <= Duration::minutes(STATE_TTL_MINUTES));
            pending.insert(state.clone(), now);
        }

        let url = reqwest::Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| LedgerError::Rejected(format!("invalid authorization endpoint: {e}")))?;

        Ok(url.to_string())
    }

    /// Validates the callback `state`, exchanges the code and persists the
    /// resulting tokens
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
        realm_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        let issued = self.pending_states.lock().await.remove(state);
        let now = Utc::now();
        match issued {
            Some(at) if now - at <= Duration::minutes(STATE_TTL_MINUTES) => {}
            _ => {
                warn!("Ledger authorization callback with unknown or expired state");
                return Err(LedgerError::InvalidState);
            }
        }

        let response = self.provider.exchange_code(code).await.map_err(|e| match e {
            OAuthError::Rejected(msg) => LedgerError::Rejected(msg),
            OAuthError::Unavailable(msg) => LedgerError::Network(msg),
        })?;

        let tokens = tokens_from(response, realm_id.map(str::to_owned), None, now);
        self.persist(&tokens).await;
        *self.tokens.lock().await = Some(tokens);

        info!(realm_id = ?realm_id, "Ledger connected");
        Ok(())
    }

    /// Returns a valid access token, refreshing it first when needed
    pub async fn access_token(&self) -> Result<AccessToken, LedgerError> {
        let mut guard = self.tokens.lock().await;
        let now = Utc::now();

        let (refresh, realm_id) = match guard.as_ref() {
            None => return Err(LedgerError::NotConnected),
            Some(t) if !t.access_expires_within(Duration::seconds(REFRESH_SKEW_SECS), now) => {
                return Ok(AccessToken {
                    token: t.access_token.clone(),
                    realm_id: t.realm_id.clone(),
                });
            }
            Some(t) => (
                t.usable_refresh_token(now)
                    .map(|token| (token.to_owned(), t.refresh_expires_at)),
                t.realm_id.clone(),
            ),
        };

        let Some((refresh_token, refresh_expires_at)) = refresh else {
            self.forget(&mut guard).await;
            return Err(LedgerError::ReauthorizationRequired(
                "refresh token missing or expired".to_string(),
            ));
        };

        match self.provider.refresh(&refresh_token).await {
            Ok(response) => {
                let previous = PreviousRefresh {
                    token: refresh_token,
                    expires_at: refresh_expires_at,
                };
                let tokens = tokens_from(response, realm_id, Some(previous), now);
                self.persist(&tokens).await;
                let access = AccessToken {
                    token: tokens.access_token.clone(),
                    realm_id: tokens.realm_id.clone(),
                };
                *guard = Some(tokens);
                info!("Ledger access token refreshed");
                Ok(access)
            }
            Err(OAuthError::Rejected(msg)) => {
                warn!(reason = %msg, "Ledger refresh token rejected");
                self.forget(&mut guard).await;
                Err(LedgerError::ReauthorizationRequired(msg))
            }
            Err(OAuthError::Unavailable(msg)) => {
                warn!(reason = %msg, "Ledger token refresh failed, keeping tokens");
                Err(LedgerError::Network(msg))
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.tokens.lock().await.is_some()
    }

    pub async fn realm_id(&self) -> Option<String> {
        self.tokens.lock().await.as_ref().and_then(|t| t.realm_id.clone())
    }

    async fn persist(&self, tokens: &OAuthTokens) {
        if let Err(e) = self.store.save(tokens).await {
            warn!(error = %e, "Failed to persist ledger tokens");
        }
    }

    async fn forget(&self, tokens: &mut Option<OAuthTokens>) {
        *tokens = None;
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear persisted ledger tokens");
        }
    }
}

/// Refresh token in use before a grant, with its known expiry
struct PreviousRefresh {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Builds the token set from a grant response
///
/// A refresh token carried over from `previous` (omitted or echoed back by
/// the server) keeps its expiry unless the response states a new one.
fn tokens_from(
    response: TokenResponse,
    realm_id: Option<String>,
    previous: Option<PreviousRefresh>,
    now: DateTime<Utc>,
) -> OAuthTokens {
    let stated_expiry = response
        .refresh_token_expires_in
        .map(|secs| now + Duration::seconds(secs));

    let (refresh_token, refresh_expires_at) = match (response.refresh_token, previous) {
        (Some(token), Some(prev)) if token == prev.token => {
            (Some(token), stated_expiry.or(prev.expires_at))
        }
        (Some(token), _) => (Some(token), stated_expiry),
        (None, Some(prev)) => (Some(prev.token), stated_expiry.or(prev.expires_at)),
        (None, None) => (None, stated_expiry),
    };

    OAuthTokens {
        access_token: response.access_token,
        refresh_token,
        access_expires_at: now + Duration::seconds(response.expires_in),
        refresh_expires_at,
        realm_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::InMemoryTokenStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider with scripted refresh behaviour
    struct FakeProvider {
        refresh_calls: AtomicUsize,
        refresh_result: Result<(), OAuthError>,
    }

    impl FakeProvider {
        fn ok() -> Self {
            Self {
                refresh_calls: AtomicUsize::new(0),
                refresh_result: Ok(()),
            }
        }

        fn failing(error: OAuthError) -> Self {
            Self {
                refresh_calls: AtomicUsize::new(0),
                refresh_result: Err(error),
            }
        }

        fn response(access: &str) -> TokenResponse {
            TokenResponse {
                access_token: access.to_string(),
                refresh_token: Some("rotated".to_string()),
                expires_in: 3600,
                refresh_token_expires_in: Some(8_640_000),
            }
        }
    }

    #[async_trait]
    impl OAuthProvider for FakeProvider {
        async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
            if code == "good-code" {
                Ok(Self::response("from-code"))
            } else {
                Err(OAuthError::Rejected("invalid_grant".to_string()))
            }
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, OAuthError> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.refresh_result
                .clone()
                .map(|_| Self::response(&format!("refreshed-{n}")))
        }
    }

    fn expiring_tokens() -> OAuthTokens {
        let now = Utc::now();
        OAuthTokens {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh".to_string()),
            access_expires_at: now + Duration::seconds(10),
            refresh_expires_at: Some(now + Duration::days(30)),
            realm_id: Some("4620".to_string()),
        }
    }

    async fn manager(
        provider: Arc<FakeProvider>,
        tokens: Option<OAuthTokens>,
    ) -> (Arc<TokenManager>, Arc<InMemoryTokenStore>) {
        let store = Arc::new(match tokens {
            Some(t) => InMemoryTokenStore::with_tokens(t),
            None => InMemoryTokenStore::new(),
        });
        let config = LedgerConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        };
        let manager = TokenManager::load(provider, store.clone(), config).await.unwrap();
        (Arc::new(manager), store)
    }

    #[tokio::test]
    async fn test_not_connected_without_tokens() {
        let (manager, _) = manager(Arc::new(FakeProvider::ok()), None).await;
        assert_eq!(manager.access_token().await, Err(LedgerError::NotConnected));
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_fresh_token_is_returned_without_refresh() {
        let provider = Arc::new(FakeProvider::ok());
        let mut tokens = expiring_tokens();
        tokens.access_expires_at = Utc::now() + Duration::hours(1);
        let (manager, _) = manager(provider.clone(), Some(tokens)).await;

        let access = manager.access_token().await.unwrap();
        assert_eq!(access.token, "stale");
        assert_eq!(access.realm_id.as_deref(), Some("4620"));
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let provider = Arc::new(FakeProvider::ok());
        let (manager, store) = manager(provider.clone(), Some(expiring_tokens())).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.access_token().await })
            })
            .collect();

        for handle in handles {
            let access = handle.await.unwrap().unwrap();
            assert_eq!(access.token, "refreshed-1");
        }
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);

        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted.access_token, "refreshed-1");
        assert_eq!(persisted.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(persisted.realm_id.as_deref(), Some("4620"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_requires_reauthorization() {
        let provider = Arc::new(FakeProvider::failing(OAuthError::Rejected("invalid_grant".into())));
        let (manager, store) = manager(provider, Some(expiring_tokens())).await;

        let result = manager.access_token().await;
        assert!(matches!(result, Err(LedgerError::ReauthorizationRequired(_))));
        assert!(!manager.is_connected().await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_refresh_keeps_tokens() {
        let provider = Arc::new(FakeProvider::failing(OAuthError::Unavailable("connection reset".into())));
        let (manager, store) = manager(provider, Some(expiring_tokens())).await;

        let result = manager.access_token().await;
        assert!(matches!(result, Err(ref e) if e.is_transient()));
        assert!(manager.is_connected().await);
        assert!(store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_refresh_token_requires_reauthorization() {
        let provider = Arc::new(FakeProvider::ok());
        let mut tokens = expiring_tokens();
        tokens.refresh_expires_at = Some(Utc::now() - Duration::days(1));
        let (manager, _) = manager(provider.clone(), Some(tokens)).await;

        let result = manager.access_token().await;
        assert!(matches!(result, Err(LedgerError::ReauthorizationRequired(_))));
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    fn bare_response(refresh_token: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "next".to_string(),
            refresh_token: refresh_token.map(str::to_owned),
            expires_in: 3600,
            refresh_token_expires_in: None,
        }
    }

    #[test]
    fn test_kept_refresh_token_keeps_its_expiry() {
        let now = Utc::now();
        let expiry = now + Duration::days(3);
        let previous = || PreviousRefresh {
            token: "refresh".to_string(),
            expires_at: Some(expiry),
        };

        let omitted = tokens_from(bare_response(None), None, Some(previous()), now);
        assert_eq!(omitted.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(omitted.refresh_expires_at, Some(expiry));

        let echoed = tokens_from(bare_response(Some("refresh")), None, Some(previous()), now);
        assert_eq!(echoed.refresh_expires_at, Some(expiry));

        // once the carried-over expiry passes, the token is no longer usable
        assert!(omitted.usable_refresh_token(expiry + Duration::seconds(1)).is_none());
    }

    #[test]
    fn test_rotated_refresh_token_takes_stated_expiry() {
        let now = Utc::now();
        let previous = PreviousRefresh {
            token: "refresh".to_string(),
            expires_at: Some(now + Duration::days(3)),
        };

        let mut response = bare_response(Some("rotated"));
        response.refresh_token_expires_in = Some(86_400);
        let tokens = tokens_from(response, None, Some(previous), now);

        assert_eq!(tokens.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(tokens.refresh_expires_at, Some(now + Duration::seconds(86_400)));
    }

    #[tokio::test]
    async fn test_authorization_flow() {
        let (manager, store) = manager(Arc::new(FakeProvider::ok()), None).await;

        let url = reqwest::Url::parse(&manager.authorization_url().await.unwrap()).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["scope"], SCOPES);
        assert_eq!(params["response_type"], "code");
        let state = params["state"].clone();

        let forged = manager.complete_authorization("good-code", "forged", Some("77")).await;
        assert_eq!(forged, Err(LedgerError::InvalidState));

        manager
            .complete_authorization("good-code", &state, Some("77"))
            .await
            .unwrap();
        assert_eq!(manager.realm_id().await.as_deref(), Some("77"));
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "from-code");

        let replay = manager.complete_authorization("good-code", &state, Some("77")).await;
        assert_eq!(replay, Err(LedgerError::InvalidState));
    }

    #[tokio::test]
    async fn test_rejected_code_is_reported() {
        let (manager, _) = manager(Arc::new(FakeProvider::ok()), None).await;
        let url = reqwest::Url::parse(&manager.authorization_url().await.unwrap()).unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let result = manager.complete_authorization("bad-code", &state, None).await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));
        assert!(!manager.is_connected().await);
    }
}
