//! PostgreSQL Expense Adapter
//!
//! Implements `ExpenseStore` on top of `ExpenseRepository`.
//!
//! Database errors are translated to `PortError` variants:
//! - `DatabaseError::NotFound` -> `PortError::NotFound`
//! - `DatabaseError::Conflict` -> `PortError::Conflict`
//! - connection failures -> `PortError::Connection`
//! - anything else -> `PortError::Internal`

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    Amount, DomainPort, ExpenseId, HealthCheckResult, HealthCheckable, PortError, UserId,
};
use domain_expense::ports::SortOrder;
use domain_expense::{
    Expense, ExpenseCategory, ExpenseQuery, ExpenseStatus, ExpenseStore, ExternalSignals,
    ReceiptRef,
};

use crate::error::DatabaseError;
use crate::repositories::{DbExpenseStatus, ExpenseFilter, ExpenseRepository, ExpenseRow};

const ADAPTER_ID: &str = "postgres-expense-store";

/// PostgreSQL-backed implementation of `ExpenseStore`
#[derive(Debug, Clone)]
pub struct PgExpenseStore {
    repository: ExpenseRepository,
    pool: PgPool,
}

impl PgExpenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ExpenseRepository::new(pool.clone()),
            pool,
        }
    }

    /// The underlying repository, for operations outside the port
    pub fn repository(&self) -> &ExpenseRepository {
        &self.repository
    }
}

impl DomainPort for PgExpenseStore {}

#[async_trait]
impl HealthCheckable for PgExpenseStore {
    async fn health_check(&self) -> HealthCheckResult {
        super::ping(&self.pool, ADAPTER_ID).await
    }
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    #[instrument(skip(self, expense), fields(expense_id = %expense.id))]
    async fn insert(&self, expense: &Expense) -> Result<(), PortError> {
        self.repository.insert(&to_row(expense)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(expense_id = %id))]
    async fn get(&self, id: ExpenseId) -> Result<Expense, PortError> {
        let row = self.repository.get_by_id(*id.as_uuid()).await?;
        Ok(from_row(row)?)
    }

    #[instrument(skip(self))]
    async fn find(&self, query: ExpenseQuery) -> Result<Vec<Expense>, PortError> {
        let filter = ExpenseFilter {
            status: query.status.map(status_to_db),
            claimant_ids: query
                .claimants
                .map(|ids| ids.iter().map(|id| *id.as_uuid()).collect()),
            exported: query.exported,
            newest_first: query.order == SortOrder::NewestFirst,
        };

        let rows = self.repository.find(&filter).await?;
        debug!(count = rows.len(), "Found expenses");
        rows.into_iter()
            .map(|row| from_row(row).map_err(PortError::from))
            .collect()
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id))]
    async fn update_pending(&self, expense: &Expense) -> Result<(), PortError> {
        self.repository.update_pending(&to_row(expense)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(expense_id = %id))]
    async fn delete_pending(&self, id: ExpenseId) -> Result<(), PortError> {
        self.repository.delete_pending(*id.as_uuid()).await?;
        Ok(())
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id, status = %expense.status))]
    async fn transition(&self, expense: &Expense) -> Result<(), PortError> {
        self.repository.transition(&to_row(expense)).await?;
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn stage_export_batch(
        &self,
        ids: &[ExpenseId],
        batch: &str,
    ) -> Result<Vec<ExpenseId>, PortError> {
        let staged = self
            .repository
            .stage_export_batch(&to_uuids(ids), batch)
            .await?;
        Ok(staged.into_iter().map(ExpenseId::from_uuid).collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn mark_exported(
        &self,
        ids: &[ExpenseId],
        ledger_record_id: &str,
    ) -> Result<Vec<ExpenseId>, PortError> {
        let marked = self
            .repository
            .mark_exported(&to_uuids(ids), ledger_record_id)
            .await?;
        Ok(marked.into_iter().map(ExpenseId::from_uuid).collect())
    }
}

fn to_uuids(ids: &[ExpenseId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

fn status_to_db(status: ExpenseStatus) -> DbExpenseStatus {
    match status {
        ExpenseStatus::Pending => DbExpenseStatus::Pending,
        ExpenseStatus::Approved => DbExpenseStatus::Approved,
        ExpenseStatus::Rejected => DbExpenseStatus::Rejected,
    }
}

fn status_from_db(status: DbExpenseStatus) -> ExpenseStatus {
    match status {
        DbExpenseStatus::Pending => ExpenseStatus::Pending,
        DbExpenseStatus::Approved => ExpenseStatus::Approved,
        DbExpenseStatus::Rejected => ExpenseStatus::Rejected,
    }
}

fn to_row(expense: &Expense) -> ExpenseRow {
    let receipt = expense.receipt.as_ref();
    ExpenseRow {
        expense_id: *expense.id.as_uuid(),
        claimant_id: *expense.claimant_id.as_uuid(),
        description: expense.description.clone(),
        amount: expense.amount.value(),
        category: expense.category.as_str().to_string(),
        expense_date: expense.expense_date,
        status: status_to_db(expense.status),
        policy_violations: expense.policy_violations.clone(),
        duplicate_receipt: expense.signals.duplicate_receipt,
        ai_violations: expense.signals.ai_violations.clone(),
        approver_id: expense.approver_id.map(|id| *id.as_uuid()),
        approval_timestamp: expense.approval_timestamp,
        notes: expense.notes.clone(),
        exported_to_ledger: expense.exported_to_ledger,
        export_batch: expense.export_batch.clone(),
        ledger_record_id: expense.ledger_record_id.clone(),
        receipt_storage_key: receipt.map(|r| r.storage_key.clone()),
        receipt_file_name: receipt.map(|r| r.file_name.clone()),
        receipt_content_type: receipt.map(|r| r.content_type.clone()),
        created_at: expense.created_at,
        updated_at: expense.updated_at,
    }
}

fn from_row(row: ExpenseRow) -> Result<Expense, DatabaseError> {
    let amount = Amount::new(row.amount).map_err(|e| {
        DatabaseError::CorruptRow(format!("expense {}: {e}", row.expense_id))
    })?;
    let category = row
        .category
        .parse::<ExpenseCategory>()
        .map_err(|e| DatabaseError::CorruptRow(format!("expense {}: {e}", row.expense_id)))?;

    let receipt = match (row.receipt_storage_key, row.receipt_file_name, row.receipt_content_type) {
        (Some(storage_key), Some(file_name), Some(content_type)) => Some(ReceiptRef {
            storage_key,
            file_name,
            content_type,
        }),
        _ => None,
    };

    Ok(Expense {
        id: ExpenseId::from_uuid(row.expense_id),
        claimant_id: UserId::from_uuid(row.claimant_id),
        description: row.description,
        amount,
        category,
        expense_date: row.expense_date,
        status: status_from_db(row.status),
        policy_violations: row.policy_violations,
        signals: ExternalSignals {
            duplicate_receipt: row.duplicate_receipt,
            ai_violations: row.ai_violations,
        },
        approver_id: row.approver_id.map(UserId::from_uuid),
        approval_timestamp: row.approval_timestamp,
        notes: row.notes,
        exported_to_ledger: row.exported_to_ledger,
        export_batch: row.export_batch,
        ledger_record_id: row.ledger_record_id,
        receipt,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
