//! Tests for interface_api
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`
//! against in-memory adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use domain_expense::ports::mock::{InMemoryExpenseStore, InMemoryUserDirectory};
use domain_expense::{
    ApprovalAuthority, Expense, ExpenseService, PolicyEvaluator, User, AMOUNT_LIMIT_VIOLATION,
};
use domain_export::ports::mock::InMemoryLedger;
use domain_export::{ExportReconciler, LedgerError, ReconcilerConfig, SyncScheduler};
use infra_ledger::{
    InMemoryTokenStore, OAuthError, OAuthProvider, QuickBooksLedgerClient, TokenManager,
    TokenResponse,
};
use interface_api::auth::create_token;
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState};
use test_utils::{AmountFixtures, ExpenseBuilder, Team};

const SECRET: &str = "api-test-secret";

/// Authorization server that grants every request
struct GrantingProvider;

#[async_trait]
impl OAuthProvider for GrantingProvider {
    async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, OAuthError> {
        Ok(grant())
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        Ok(grant())
    }
}

fn grant() -> TokenResponse {
    TokenResponse {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_in: 3600,
        refresh_token_expires_in: Some(8_640_000),
    }
}

struct Harness {
    app: Router,
    team: Team,
    store: Arc<InMemoryExpenseStore>,
    ledger: Arc<InMemoryLedger>,
    tokens: Arc<TokenManager>,
}

impl Harness {
    async fn new(expenses: Vec<Expense>) -> Self {
        Self::with_config(Team::new(), expenses, test_config()).await
    }

    async fn with_config(team: Team, expenses: Vec<Expense>, config: ApiConfig) -> Self {
        let store = Arc::new(InMemoryExpenseStore::with_expenses(expenses).await);
        let users = Arc::new(InMemoryUserDirectory::with_users(team.all()).await);
        let ledger = Arc::new(InMemoryLedger::new());

        let reconciler = Arc::new(ExportReconciler::new(
            store.clone(),
            users.clone(),
            ledger.clone(),
            ReconcilerConfig::default(),
        ));
        let scheduler = Arc::new(SyncScheduler::new(reconciler, config.sync_interval()));

        let ledger_config = config.ledger_config().unwrap();
        let tokens = Arc::new(
            TokenManager::load(
                Arc::new(GrantingProvider),
                Arc::new(InMemoryTokenStore::new()),
                ledger_config.clone(),
            )
            .await
            .unwrap(),
        );
        let client = Arc::new(QuickBooksLedgerClient::new(ledger_config, tokens.clone()).unwrap());

        let state = AppState {
            expenses: Arc::new(ExpenseService::new(
                store.clone(),
                PolicyEvaluator::new(config.policy_config()),
            )),
            approvals: Arc::new(ApprovalAuthority::new(
                store.clone(),
                users.clone(),
                config.approval_config(),
            )),
            config: Arc::new(config),
            store: store.clone(),
            users,
            scheduler,
            ledger: client,
        };

        Self {
            app: create_router(state),
            team,
            store,
            ledger,
            tokens,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        as_user: Option<&User>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        send(&self.app, method, uri, as_user, body).await
    }
}

fn test_config() -> ApiConfig {
    ApiConfig {
        jwt_secret: SECRET.to_string(),
        ledger_client_id: "client".to_string(),
        ledger_client_secret: "secret".to_string(),
        ..ApiConfig::default()
    }
}

fn bearer(user: &User) -> String {
    let token = create_token(
        &user.id.as_uuid().to_string(),
        vec![user.role.as_str().to_string()],
        SECRET,
        300,
    )
    .unwrap();
    format!("Bearer {token}")
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    as_user: Option<&User>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = as_user {
        request = request.header(header::AUTHORIZATION, bearer(user));
    }
    let request = match body {
        Some(json) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let h = Harness::new(vec![]).await;

        let (status, body) = h.send(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = h.send(Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = Harness::new(vec![]).await;
        let (status, body) = h
            .send(Method::GET, "/api/v1/approvals/pending", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_unauthorized() {
        let h = Harness::new(vec![]).await;
        let token = create_token(
            &h.team.manager.id.as_uuid().to_string(),
            vec!["manager".to_string()],
            "not-the-secret",
            300,
        )
        .unwrap();

        let request = Request::builder()
            .uri("/api/v1/approvals/pending")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

mod expense_tests {
    use super::*;

    #[tokio::test]
    async fn test_submission_records_violations() {
        let h = Harness::new(vec![]).await;
        let alice = h.team.alice.clone();

        let (status, body) = h
            .send(
                Method::POST,
                "/api/v1/expenses",
                Some(&alice),
                Some(json!({
                    "description": "Conference hotel",
                    "amount": 1200,
                    "category": "Travel",
                    "expense_date": "2026-03-02"
                })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "Pending");
        assert_eq!(body["policy_violations"], json!([AMOUNT_LIMIT_VIOLATION]));
        assert_eq!(body["has_receipt"], false);

        let stored = h.store.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].claimant_id, alice.id);
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let h = Harness::new(vec![]).await;
        let (status, body) = h
            .send(
                Method::POST,
                "/api/v1/expenses",
                Some(&h.team.alice),
                Some(json!({
                    "description": "Refund",
                    "amount": 0,
                    "category": "Meals",
                    "expense_date": "2026-03-02"
                })),
            )
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
        assert!(h.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_only_claimant_and_reviewers_see_an_expense() {
        let team = Team::new();
        let expense = ExpenseBuilder::new(team.alice.id).build();
        let h = Harness::with_config(team, vec![expense.clone()], test_config()).await;
        let uri = format!("/api/v1/expenses/{}", expense.id.as_uuid());

        let (status, _) = h.send(Method::GET, &uri, Some(&h.team.alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = h.send(Method::GET, &uri, Some(&h.team.finance), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = h.send(Method::GET, &uri, Some(&h.team.bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_claimant_deletes_pending_expense() {
        let team = Team::new();
        let expense = ExpenseBuilder::new(team.alice.id).build();
        let h = Harness::with_config(team, vec![expense.clone()], test_config()).await;
        let uri = format!("/api/v1/expenses/{}", expense.id.as_uuid());

        let (status, _) = h.send(Method::DELETE, &uri, Some(&h.team.bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = h.send(Method::DELETE, &uri, Some(&h.team.alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        let (status, _) = h.send(Method::GET, &uri, Some(&h.team.alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_revision_reevaluates_policy() {
        let team = Team::new();
        let expense = ExpenseBuilder::new(team.alice.id).build();
        let h = Harness::with_config(team, vec![expense.clone()], test_config()).await;
        let uri = format!("/api/v1/expenses/{}", expense.id.as_uuid());

        let (status, body) = h
            .send(Method::PATCH, &uri, Some(&h.team.alice), Some(json!({ "amount": 1500 })))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["policy_violations"], json!([AMOUNT_LIMIT_VIOLATION]));
    }

    #[tokio::test]
    async fn test_own_list_is_scoped_to_caller() {
        let team = Team::new();
        let mine = ExpenseBuilder::new(team.alice.id).build();
        let theirs = ExpenseBuilder::new(team.bob.id).build();
        let h = Harness::with_config(team, vec![mine.clone(), theirs], test_config()).await;

        let (status, body) = h
            .send(Method::GET, "/api/v1/expenses", Some(&h.team.alice), None)
            .await;

        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], json!(mine.id.as_uuid()));
    }
}

mod approval_tests {
    use super::*;

    #[tokio::test]
    async fn test_manager_sees_only_team_expenses_with_claimant_details() {
        let team = Team::new();
        let alice_claim = ExpenseBuilder::new(team.alice.id).receipt("lunch.pdf").build();
        let bob_claim = ExpenseBuilder::new(team.bob.id).build();
        let outsider = ExpenseBuilder::new(team.loner.id).build();
        let h = Harness::with_config(
            team,
            vec![alice_claim.clone(), bob_claim.clone(), outsider],
            test_config(),
        )
        .await;

        let (status, body) = h
            .send(Method::GET, "/api/v1/approvals/pending", Some(&h.team.manager), None)
            .await;

        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 2);
        // newest first
        assert_eq!(list[0]["id"], json!(bob_claim.id.as_uuid()));
        assert_eq!(list[1]["claimant"]["name"], "Alice Adams");
        assert_eq!(list[1]["has_receipt"], true);
        assert!(list[1].get("receipt").is_none());
    }

    #[tokio::test]
    async fn test_employee_cannot_list_pending() {
        let h = Harness::new(vec![]).await;
        let (status, body) = h
            .send(Method::GET, "/api/v1/approvals/pending", Some(&h.team.alice), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn test_approve_then_approve_again_conflicts() {
        let team = Team::new();
        let expense = ExpenseBuilder::new(team.alice.id).build();
        let h = Harness::with_config(team, vec![expense.clone()], test_config()).await;
        let uri = format!("/api/v1/approvals/{}/approve", expense.id.as_uuid());

        let (status, body) = h
            .send(Method::POST, &uri, Some(&h.team.manager), Some(json!({ "notes": "ok" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Approved");
        assert_eq!(body["approver_id"], json!(h.team.manager.id.as_uuid()));

        let (status, body) = h.send(Method::POST, &uri, Some(&h.team.finance), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_manager_cannot_approve_another_teams_expense() {
        let team = Team::new();
        let other_manager = test_utils::UserBuilder::new()
            .role(domain_expense::Role::Manager)
            .build();
        let expense = ExpenseBuilder::new(team.alice.id).build();
        let h = Harness::with_config(team, vec![expense.clone()], test_config()).await;
        let uri = format!("/api/v1/approvals/{}/approve", expense.id.as_uuid());

        let (status, _) = h.send(Method::POST, &uri, Some(&other_manager), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let team = Team::new();
        let expense = ExpenseBuilder::new(team.alice.id).build();
        let h = Harness::with_config(team, vec![expense.clone()], test_config()).await;
        let uri = format!("/api/v1/approvals/{}/reject", expense.id.as_uuid());

        let (status, _) = h
            .send(Method::POST, &uri, Some(&h.team.manager), Some(json!({ "notes": "" })))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = h
            .send(
                Method::POST,
                &uri,
                Some(&h.team.manager),
                Some(json!({ "notes": "Missing receipt" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Rejected");
        assert!(body["notes"].as_str().unwrap().contains("Missing receipt"));
    }

    #[tokio::test]
    async fn test_unknown_expense_is_not_found() {
        let h = Harness::new(vec![]).await;
        let uri = format!("/api/v1/approvals/{}/approve", uuid::Uuid::now_v7());
        let (status, _) = h.send(Method::POST, &uri, Some(&h.team.finance), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod ledger_tests {
    use super::*;

    fn approved(team: &Team, claimant: &User) -> Expense {
        ExpenseBuilder::new(claimant.id)
            .amount(AmountFixtures::hotel())
            .approved_by(team.manager.id)
            .build()
    }

    #[tokio::test]
    async fn test_finance_exports_approved_expenses() {
        let team = Team::new();
        let expenses = vec![approved(&team, &team.alice), approved(&team, &team.alice)];
        let h = Harness::with_config(team, expenses, test_config()).await;

        let (status, body) = h
            .send(Method::POST, "/api/v1/ledger/export", Some(&h.team.finance), None)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exported_expenses"], 2);
        assert_eq!(body["trigger"], "manual");
        assert_eq!(h.ledger.record_count().await, 1);
        assert!(h.store.all().await.iter().all(|e| e.exported_to_ledger));

        let (status, body) = h
            .send(Method::POST, "/api/v1/ledger/export", Some(&h.team.finance), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Nothing to export");
    }

    #[tokio::test]
    async fn test_export_requires_finance() {
        let h = Harness::new(vec![]).await;
        let (status, _) = h
            .send(Method::POST, "/api/v1/ledger/export", Some(&h.team.manager), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_export_reports_reauthorization() {
        let team = Team::new();
        let expenses = vec![approved(&team, &team.alice)];
        let h = Harness::with_config(team, expenses, test_config()).await;
        h.ledger
            .fail_for(
                h.team.alice.id,
                LedgerError::ReauthorizationRequired("refresh token revoked".to_string()),
            )
            .await;

        let (status, body) = h
            .send(Method::POST, "/api/v1/ledger/export", Some(&h.team.finance), None)
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "reauthorization_required");
        assert!(h.store.all().await.iter().all(|e| !e.exported_to_ledger));
    }

    #[tokio::test]
    async fn test_overlapping_export_is_refused() {
        let team = Team::new();
        let expenses = vec![approved(&team, &team.alice)];
        let h = Harness::with_config(team, expenses, test_config()).await;
        h.ledger.set_delay(Duration::from_millis(300)).await;

        let app = h.app.clone();
        let finance = h.team.finance.clone();
        let first = tokio::spawn(async move {
            send(&app, Method::POST, "/api/v1/ledger/export", Some(&finance), None).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (status, _) = h
            .send(Method::POST, "/api/v1/ledger/export", Some(&h.team.finance), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.ledger.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_status_when_not_connected() {
        let h = Harness::new(vec![]).await;
        let (status, body) = h
            .send(Method::GET, "/api/v1/ledger/status", Some(&h.team.alice), None)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ledger"]["connected"], false);
        assert_eq!(body["ledger"]["reauthorization_required"], true);
        assert_eq!(body["sync"]["state"], "idle");
        assert_eq!(body["sync"]["interval_secs"], 900);
    }

    #[tokio::test]
    async fn test_auth_url_requires_credentials() {
        let config = ApiConfig {
            ledger_client_id: String::new(),
            ..test_config()
        };
        let h = Harness::with_config(Team::new(), vec![], config).await;

        let (status, _) = h
            .send(Method::GET, "/api/v1/ledger/auth-url", Some(&h.team.finance), None)
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_consent_round_trip() {
        let h = Harness::new(vec![]).await;

        let (status, body) = h
            .send(Method::GET, "/api/v1/ledger/auth-url", Some(&h.team.finance), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let oauth_state = query_param(body["url"].as_str().unwrap(), "state").unwrap();

        let callback = format!("/ledger/callback?code=abc&state={oauth_state}&realmId=9130");
        let (status, body) = h.send(Method::GET, &callback, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["realm_id"], "9130");
        assert!(h.tokens.is_connected().await);

        // a state can only be used once
        let (status, _) = h.send(Method::GET, &callback, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_declined_consent() {
        let h = Harness::new(vec![]).await;
        let (status, body) = h
            .send(Method::GET, "/ledger/callback?error=access_denied", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("access_denied"));
        assert!(!h.tokens.is_connected().await);
    }

    /// Extracts a query parameter from a URL
    fn query_param(url: &str, name: &str) -> Option<String> {
        let query = url.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }
}
