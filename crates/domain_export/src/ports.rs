//! Ledger port
//!
//! The reconciler talks to the external accounting system only through
//! [`LedgerPort`]. The production adapter lives in `infra_ledger`.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, ExpenseId, UserId};

use crate::error::LedgerError;

/// One line of a reimbursement record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReimbursementLine {
    pub expense_id: ExpenseId,
    pub description: String,
    pub amount: Decimal,
    /// Ledger expense account name
    pub account: String,
    pub expense_date: NaiveDate,
}

/// A reimbursement for one claimant batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReimbursementRequest {
    /// Batch key; the same batch always carries the same key
    pub idempotency_key: String,
    pub claimant_id: UserId,
    /// Vendor display name in the ledger
    pub payee_name: String,
    pub payee_email: Option<String>,
    pub lines: Vec<ReimbursementLine>,
}

impl ReimbursementRequest {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.amount).sum()
    }

    pub fn expense_ids(&self) -> Vec<ExpenseId> {
        self.lines.iter().map(|l| l.expense_id).collect()
    }
}

/// Confirmation of a ledger write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReimbursementReceipt {
    /// External record id
    pub record_id: String,
    /// True when the record was found by its idempotency key rather than
    /// created by this call
    pub already_existed: bool,
}

/// Port onto the external ledger
#[async_trait]
pub trait LedgerPort: DomainPort {
    /// Writes one reimbursement record, or returns the existing record for
    /// the same idempotency key
    async fn write_reimbursement(
        &self,
        request: &ReimbursementRequest,
    ) -> Result<ReimbursementReceipt, LedgerError>;
}

/// In-memory ledger for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::RwLock;

    /// Ledger that keeps records in memory
    ///
    /// Records are keyed by idempotency key, so retried batches are found
    /// instead of duplicated. Failures can be injected per claimant.
    #[derive(Debug, Default)]
    pub struct InMemoryLedger {
        records: RwLock<HashMap<String, (String, ReimbursementRequest)>>,
        failures: RwLock<HashMap<UserId, LedgerError>>,
        delay: RwLock<Option<Duration>>,
        calls: AtomicUsize,
        created: AtomicUsize,
    }

    impl InMemoryLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every write for `claimant` fail with `error`
        pub async fn fail_for(&self, claimant: UserId, error: LedgerError) {
            self.failures.write().await.insert(claimant, error);
        }

        /// Removes injected failures
        pub async fn heal(&self) {
            self.failures.write().await.clear();
        }

        /// Delays every write
        pub async fn set_delay(&self, delay: Duration) {
            *self.delay.write().await = Some(delay);
        }

        /// Number of write calls received
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Number of records actually created
        pub fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        /// Stored request for a batch key
        pub async fn record(&self, key: &str) -> Option<ReimbursementRequest> {
            self.records.read().await.get(key).map(|(_, request)| request.clone())
        }

        /// Number of stored records
        pub async fn record_count(&self) -> usize {
            self.records.read().await.len()
        }
    }

    impl DomainPort for InMemoryLedger {}

    #[async_trait]
    impl LedgerPort for InMemoryLedger {
        async fn write_reimbursement(
            &self,
            request: &ReimbursementRequest,
        ) -> Result<ReimbursementReceipt, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.delay.read().await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = self.failures.read().await.get(&request.claimant_id) {
                return Err(error.clone());
            }

            let mut records = self.records.write().await;
            if let Some((record_id, _)) = records.get(&request.idempotency_key) {
                return Ok(ReimbursementReceipt {
                    record_id: record_id.clone(),
                    already_existed: true,
                });
            }

            let record_id = format!("BILL-{}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
            records.insert(
                request.idempotency_key.clone(),
                (record_id.clone(), request.clone()),
            );
            Ok(ReimbursementReceipt {
                record_id,
                already_existed: false,
            })
        }
    }
}
