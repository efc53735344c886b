//! QuickBooks Ledger Client
//!
//! Implements [`LedgerPort`] against the QuickBooks Online accounting API.
//! Each claimant batch becomes one vendor bill:
//!
//! 1. look up a bill whose `DocNumber` is the batch key; if found, return it
//! 2. resolve (or create) the vendor by display name
//! 3. resolve (or create) each expense account by name
//! 4. create the bill with one line per expense, passing the batch key as
//!    the `requestid` so the API itself deduplicates a retried create
//!
//! # Error Handling
//!
//! HTTP failures are mapped to `LedgerError` variants:
//! - 401 -> `ReauthorizationRequired`
//! - 429 -> `RateLimited`
//! - 5xx -> `ServiceUnavailable`
//! - other 4xx -> `Rejected` with the fault message
//! - timeouts -> `Timeout`, other transport errors -> `Network`

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable};
use domain_export::{LedgerError, LedgerPort, ReimbursementReceipt, ReimbursementRequest};

use crate::config::LedgerConfig;
use crate::manager::{AccessToken, TokenManager};

const ADAPTER_ID: &str = "quickbooks-ledger";

/// Ledger connection state as reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub realm_id: Option<String>,
    pub company_name: Option<String>,
    pub reauthorization_required: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Entity {
    id: String,
}

#[derive(Debug, Serialize)]
struct Reference {
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VendorPayload<'a> {
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_email_addr: Option<EmailAddress<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EmailAddress<'a> {
    address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AccountPayload<'a> {
    name: &'a str,
    account_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BillPayload<'a> {
    vendor_ref: Reference,
    doc_number: &'a str,
    txn_date: NaiveDate,
    private_note: String,
    line: Vec<BillLine<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BillLine<'a> {
    description: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    detail_type: &'static str,
    account_based_expense_line_detail: AccountLineDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AccountLineDetail {
    account_ref: Reference,
}

/// Ledger adapter for QuickBooks Online
pub struct QuickBooksLedgerClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    config: LedgerConfig,
}

impl QuickBooksLedgerClient {
    pub fn new(config: LedgerConfig, tokens: Arc<TokenManager>) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;
        Ok(Self { http, tokens, config })
    }

    /// Token manager behind this client
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Reports whether the ledger is connected and reachable
    pub async fn connection_status(&self) -> ConnectionStatus {
        match self.company_name().await {
            Ok((realm_id, company_name)) => ConnectionStatus {
                connected: true,
                realm_id: Some(realm_id),
                company_name,
                reauthorization_required: false,
                detail: None,
            },
            Err(e) => ConnectionStatus {
                connected: false,
                realm_id: self.tokens.realm_id().await,
                company_name: None,
                reauthorization_required: e.requires_reauthorization(),
                detail: Some(e.to_string()),
            },
        }
    }

    async fn company_name(&self) -> Result<(String, Option<String>), LedgerError> {
        let access = self.tokens.access_token().await?;
        let realm = realm_of(&access)?;
        let url = self.company_url(realm, &format!("companyinfo/{realm}"));
        let body = self
            .send(self.http.get(url).bearer_auth(&access.token))
            .await?;
        let name = body["CompanyInfo"]["CompanyName"].as_str().map(str::to_owned);
        Ok((realm.to_string(), name))
    }

    fn company_url(&self, realm: &str, path: &str) -> String {
        format!(
            "{}/v3/company/{}/{}",
            self.config.api_base_url().trim_end_matches('/'),
            realm,
            path
        )
    }

    /// Finds the first entity whose `field` equals `value`
    async fn find_one(
        &self,
        access: &AccessToken,
        entity: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Entity>, LedgerError> {
        let realm = realm_of(access)?;
        let statement = format!(
            "select * from {entity} where {field} = '{}'",
            escape_query_value(value)
        );
        let minor = self.config.minor_version.to_string();
        let request = self
            .http
            .get(self.company_url(realm, "query"))
            .bearer_auth(&access.token)
            .query(&[("query", statement.as_str()), ("minorversion", minor.as_str())]);

        let body = self.send(request).await?;
        let found: Vec<Entity> = match body["QueryResponse"].get(entity) {
            Some(list) => decode(list.clone())?,
            None => Vec::new(),
        };
        Ok(found.into_iter().next())
    }

    async fn create<P: Serialize>(
        &self,
        access: &AccessToken,
        path: &str,
        entity: &str,
        payload: &P,
        request_id: &str,
    ) -> Result<Entity, LedgerError> {
        let realm = realm_of(access)?;
        let minor = self.config.minor_version.to_string();
        let request = self
            .http
            .post(self.company_url(realm, path))
            .bearer_auth(&access.token)
            .query(&[("requestid", request_id), ("minorversion", minor.as_str())])
            .json(payload);

        let body = self.send(request).await?;
        decode(body[entity].clone())
    }

    async fn resolve_vendor(
        &self,
        access: &AccessToken,
        request: &ReimbursementRequest,
    ) -> Result<String, LedgerError> {
        if let Some(vendor) = self
            .find_one(access, "Vendor", "DisplayName", &request.payee_name)
            .await?
        {
            return Ok(vendor.id);
        }

        let payload = VendorPayload {
            display_name: &request.payee_name,
            primary_email_addr: request
                .payee_email
                .as_deref()
                .map(|address| EmailAddress { address }),
        };
        let request_id = derived_request_id(&request.idempotency_key, "vendor");
        let vendor = self.create(access, "vendor", "Vendor", &payload, &request_id).await?;
        info!(vendor_id = %vendor.id, payee = %request.payee_name, "Ledger vendor created");
        Ok(vendor.id)
    }

    async fn resolve_account(
        &self,
        access: &AccessToken,
        batch: &str,
        name: &str,
    ) -> Result<String, LedgerError> {
        if let Some(account) = self.find_one(access, "Account", "Name", name).await? {
            return Ok(account.id);
        }

        let payload = AccountPayload {
            name,
            account_type: "Expense",
        };
        let request_id = derived_request_id(batch, &format!("account/{name}"));
        let account = self.create(access, "account", "Account", &payload, &request_id).await?;
        info!(account_id = %account.id, account = %name, "Ledger expense account created");
        Ok(account.id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, LedgerError> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "Ledger call failed");
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> LedgerError {
        if error.is_timeout() {
            LedgerError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            LedgerError::Network(error.to_string())
        }
    }
}

impl DomainPort for QuickBooksLedgerClient {}

#[async_trait]
impl LedgerPort for QuickBooksLedgerClient {
    #[instrument(skip(self, request), fields(batch = %request.idempotency_key, claimant = %request.claimant_id))]
    async fn write_reimbursement(
        &self,
        request: &ReimbursementRequest,
    ) -> Result<ReimbursementReceipt, LedgerError> {
        let access = self.tokens.access_token().await?;

        if let Some(existing) = self
            .find_one(&access, "Bill", "DocNumber", &request.idempotency_key)
            .await?
        {
            info!(record_id = %existing.id, "Ledger bill already exists for batch");
            return Ok(ReimbursementReceipt {
                record_id: existing.id,
                already_existed: true,
            });
        }

        let vendor_id = self.resolve_vendor(&access, request).await?;

        let mut accounts: HashMap<&str, String> = HashMap::new();
        for line in &request.lines {
            if !accounts.contains_key(line.account.as_str()) {
                let id = self
                    .resolve_account(&access, &request.idempotency_key, &line.account)
                    .await?;
                accounts.insert(line.account.as_str(), id);
            }
        }

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let account_id = accounts
                .get(line.account.as_str())
                .cloned()
                .ok_or_else(|| LedgerError::Decode(format!("unresolved account {}", line.account)))?;
            lines.push(BillLine {
                description: &line.description,
                amount: line.amount,
                detail_type: "AccountBasedExpenseLineDetail",
                account_based_expense_line_detail: AccountLineDetail {
                    account_ref: Reference { value: account_id },
                },
            });
        }

        let payload = BillPayload {
            vendor_ref: Reference { value: vendor_id },
            doc_number: &request.idempotency_key,
            txn_date: Utc::now().date_naive(),
            private_note: format!(
                "Expense reimbursement for {} ({} items)",
                request.payee_name,
                request.lines.len()
            ),
            line: lines,
        };

        let bill = self
            .create(&access, "bill", "Bill", &payload, &request.idempotency_key)
            .await?;
        info!(record_id = %bill.id, total = %request.total(), "Ledger bill created");

        Ok(ReimbursementReceipt {
            record_id: bill.id,
            already_existed: false,
        })
    }
}

#[async_trait]
impl HealthCheckable for QuickBooksLedgerClient {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        match self.company_name().await {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, start.elapsed().as_millis() as u64),
            Err(e) => HealthCheckResult::unhealthy(ADAPTER_ID, e.to_string()),
        }
    }
}

fn realm_of(access: &AccessToken) -> Result<&str, LedgerError> {
    access.realm_id.as_deref().ok_or(LedgerError::NotConnected)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, LedgerError> {
    serde_json::from_value(value).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Deterministic request id for the auxiliary creates of a batch
fn derived_request_id(batch: &str, purpose: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{batch}/{purpose}").as_bytes())
        .simple()
        .to_string()
}

/// Query language string literals escape single quotes with a backslash
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn status_error(status: StatusCode, body: &str) -> LedgerError {
    match status.as_u16() {
        401 => LedgerError::ReauthorizationRequired("access token rejected by the ledger".to_string()),
        429 => LedgerError::RateLimited,
        code if code >= 500 => LedgerError::ServiceUnavailable(code),
        code => LedgerError::Rejected(fault_message(body).unwrap_or_else(|| format!("HTTP {code}"))),
    }
}

/// Extracts the first error of a `Fault` response body
fn fault_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("Fault")?.get("Error")?.get(0)?;
    let message = error.get("Message").and_then(Value::as_str).unwrap_or("Request rejected");
    Some(match error.get("Detail").and_then(Value::as_str) {
        Some(detail) => format!("{message}: {detail}"),
        None => message.to_string(),
    })
}
