//! Export reconciler
//!
//! One pass selects approved, unexported expenses, groups them per
//! claimant and writes each group to the ledger as a single reimbursement.
//! Groups are failure-isolated: one claimant's failure never prevents
//! another claimant's batch from being exported.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use core_kernel::{PortError, UserId};
use domain_expense::{Expense, ExpenseQuery, ExpenseStore, User, UserDirectory};

use crate::account::expense_account;
use crate::batch::batch_key;
use crate::error::{ExportError, LedgerError};
use crate::ports::{LedgerPort, ReimbursementLine, ReimbursementRequest};
use crate::report::{ExportFailure, ExportSuccess, ReconciliationReport, SyncTrigger};

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Upper bound on a single ledger write
    pub write_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// Expenses of one claimant exported under one batch key
#[derive(Debug)]
struct ExportGroup {
    claimant_id: UserId,
    /// Key the group was staged under by an earlier pass
    batch: Option<String>,
    expenses: Vec<Expense>,
}

/// Drives approved expenses into the external ledger
pub struct ExportReconciler {
    store: Arc<dyn ExpenseStore>,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<dyn LedgerPort>,
    config: ReconcilerConfig,
}

impl ExportReconciler {
    pub fn new(
        store: Arc<dyn ExpenseStore>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<dyn LedgerPort>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { store, users, ledger, config }
    }

    /// Runs one complete pass
    pub async fn reconcile(&self, trigger: SyncTrigger) -> Result<ReconciliationReport, ExportError> {
        self.reconcile_until(trigger, &CancellationToken::new()).await
    }

    /// Runs one pass, stopping between groups once `cancel` fires
    pub async fn reconcile_until(
        &self,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationReport, ExportError> {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let mut report = ReconciliationReport::start(trigger);
        let candidates = self.store.find(ExpenseQuery::awaiting_export()).await?;
        if candidates.is_empty() {
            debug!(run_id = %report.run_id, %trigger, "Nothing to export");
            return Ok(report.finish());
        }

        let groups = group_by_claimant(candidates);
        info!(
            run_id = %report.run_id,
            %trigger,
            batches = groups.len(),
            "Reconciliation started"
        );

        for group in groups {
            if cancel.is_cancelled() {
                warn!(run_id = %report.run_id, "Reconciliation cancelled between batches");
                report.cancelled = true;
                break;
            }

            let claimant_id = group.claimant_id;
            match self.export_group(group).await {
                Ok(Some(success)) => {
                    info!(
                        run_id = %report.run_id,
                        claimant = %claimant_id,
                        record_id = %success.external_record_id,
                        expenses = success.expense_count,
                        already_existed = success.already_existed,
                        "Batch exported"
                    );
                    report.successes.push(success);
                }
                Ok(None) => {}
                Err(failure) => {
                    warn!(
                        run_id = %report.run_id,
                        claimant = %claimant_id,
                        error = %failure.error_detail,
                        reauthorization_required = failure.reauthorization_required,
                        "Batch export failed"
                    );
                    report.failures.push(failure);
                }
            }
        }

        let report = report.finish();
        info!(
            run_id = %report.run_id,
            exported = report.exported_count(),
            failed = report.failures.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn export_group(&self, group: ExportGroup) -> Result<Option<ExportSuccess>, ExportFailure> {
        let claimant_id = group.claimant_id;

        let (batch, expenses) = match group.batch {
            Some(key) => (key, group.expenses),
            None => self
                .stage(claimant_id, group.expenses)
                .await
                .map_err(|e| failure(claimant_id, format!("Failed to stage batch: {e}"), false))?,
        };
        if expenses.is_empty() {
            return Ok(None);
        }

        let claimant = self
            .users
            .get_user(claimant_id)
            .await
            .map_err(|e| failure(claimant_id, format!("Failed to resolve claimant: {e}"), false))?
            .ok_or_else(|| failure(claimant_id, format!("Claimant {claimant_id} not found"), false))?;

        let request = build_request(batch, &claimant, &expenses);
        let receipt = match tokio::time::timeout(
            self.config.write_timeout,
            self.ledger.write_reimbursement(&request),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(error)) => return Err(ledger_failure(claimant_id, error)),
            Err(_) => {
                let error = LedgerError::Timeout(self.config.write_timeout.as_millis() as u64);
                return Err(ledger_failure(claimant_id, error));
            }
        };

        let marked = self
            .store
            .mark_exported(&request.expense_ids(), &receipt.record_id)
            .await
            .map_err(|e| {
                failure(
                    claimant_id,
                    format!("Ledger record {} written but not marked: {e}", receipt.record_id),
                    false,
                )
            })?;

        let total_amount: Decimal = expenses
            .iter()
            .filter(|e| marked.contains(&e.id))
            .map(|e| e.amount.value())
            .sum();

        Ok(Some(ExportSuccess {
            claimant_id,
            claimant_name: claimant.display_name().to_string(),
            expense_count: marked.len(),
            total_amount,
            external_record_id: receipt.record_id,
            already_existed: receipt.already_existed,
        }))
    }

    /// Stamps a new batch key on unstaged expenses; returns the key and the
    /// expenses actually stamped
    async fn stage(
        &self,
        claimant: UserId,
        expenses: Vec<Expense>,
    ) -> Result<(String, Vec<Expense>), PortError> {
        let ids: Vec<_> = expenses.iter().map(|e| e.id).collect();
        let key = batch_key(claimant, &ids);
        let staged = self.store.stage_export_batch(&ids, &key).await?;
        debug!(claimant = %claimant, batch = %key, staged = staged.len(), "Batch staged");

        let expenses = expenses.into_iter().filter(|e| staged.contains(&e.id)).collect();
        Ok((key, expenses))
    }
}

/// Groups expenses per claimant in first-seen order; within a claimant,
/// expenses already staged keep their batch and unstaged ones form one new
/// group
fn group_by_claimant(expenses: Vec<Expense>) -> Vec<ExportGroup> {
    let mut claimants: Vec<(UserId, Vec<ExportGroup>)> = Vec::new();

    for expense in expenses {
        let index = match claimants.iter().position(|(id, _)| *id == expense.claimant_id) {
            Some(index) => index,
            None => {
                claimants.push((expense.claimant_id, Vec::new()));
                claimants.len() - 1
            }
        };

        let groups = &mut claimants[index].1;
        match groups.iter_mut().find(|g| g.batch == expense.export_batch) {
            Some(group) => group.expenses.push(expense),
            None => groups.push(ExportGroup {
                claimant_id: expense.claimant_id,
                batch: expense.export_batch.clone(),
                expenses: vec![expense],
            }),
        }
    }

    claimants.into_iter().flat_map(|(_, groups)| groups).collect()
}

fn build_request(batch: String, claimant: &User, expenses: &[Expense]) -> ReimbursementRequest {
    ReimbursementRequest {
        idempotency_key: batch,
        claimant_id: claimant.id,
        payee_name: claimant.display_name().to_string(),
        payee_email: Some(claimant.email.clone()).filter(|e| !e.is_empty()),
        lines: expenses
            .iter()
            .map(|e| ReimbursementLine {
                expense_id: e.id,
                description: e.description.clone(),
                amount: e.amount.value(),
                account: expense_account(e.category).to_string(),
                expense_date: e.expense_date,
            })
            .collect(),
    }
}

fn failure(claimant_id: UserId, error_detail: String, reauthorization_required: bool) -> ExportFailure {
    ExportFailure {
        claimant_id,
        error_detail,
        reauthorization_required,
    }
}

fn ledger_failure(claimant_id: UserId, error: LedgerError) -> ExportFailure {
    failure(claimant_id, error.to_string(), error.requires_reauthorization())
}
