//! Expense repository implementation
//!
//! Every write after insert is conditional on the stored status so that
//! concurrent reviewers and reconciliation passes cannot overwrite each
//! other. A conditional write that matches no row is reported as
//! `NotFound` when the row is absent and `Conflict` otherwise.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Expense status as stored in the `expense_status` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "expense_status", rename_all = "snake_case")]
pub enum DbExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

/// One row of the `expenses` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ExpenseRow {
    pub expense_id: Uuid,
    pub claimant_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub expense_date: NaiveDate,
    pub status: DbExpenseStatus,
    pub policy_violations: Vec<String>,
    pub duplicate_receipt: bool,
    pub ai_violations: Vec<String>,
    pub approver_id: Option<Uuid>,
    pub approval_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub exported_to_ledger: bool,
    pub export_batch: Option<String>,
    pub ledger_record_id: Option<String>,
    pub receipt_storage_key: Option<String>,
    pub receipt_file_name: Option<String>,
    pub receipt_content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for [`ExpenseRepository::find`]; `None` matches everything
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub status: Option<DbExpenseStatus>,
    pub claimant_ids: Option<Vec<Uuid>>,
    pub exported: Option<bool>,
    pub newest_first: bool,
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        expense_id, claimant_id, description, amount, category, expense_date,
        status, policy_violations, duplicate_receipt, ai_violations,
        approver_id, approval_timestamp, notes,
        exported_to_ledger, export_batch, ledger_record_id,
        receipt_storage_key, receipt_file_name, receipt_content_type,
        created_at, updated_at
    FROM expenses
"#;

const FIND_FILTER: &str = r#"
    WHERE ($1::expense_status IS NULL OR status = $1)
      AND ($2::uuid[] IS NULL OR claimant_id = ANY($2))
      AND ($3::boolean IS NULL OR exported_to_ledger = $3)
"#;

/// Repository for the `expenses` table
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: PgPool,
}

impl ExpenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new expense row
    pub async fn insert(&self, row: &ExpenseRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO expenses (
                expense_id, claimant_id, description, amount, category, expense_date,
                status, policy_violations, duplicate_receipt, ai_violations,
                approver_id, approval_timestamp, notes,
                exported_to_ledger, export_batch, ledger_record_id,
                receipt_storage_key, receipt_file_name, receipt_content_type,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(row.expense_id)
        .bind(row.claimant_id)
        .bind(&row.description)
        .bind(row.amount)
        .bind(&row.category)
        .bind(row.expense_date)
        .bind(row.status)
        .bind(&row.policy_violations)
        .bind(row.duplicate_receipt)
        .bind(&row.ai_violations)
        .bind(row.approver_id)
        .bind(row.approval_timestamp)
        .bind(&row.notes)
        .bind(row.exported_to_ledger)
        .bind(&row.export_batch)
        .bind(&row.ledger_record_id)
        .bind(&row.receipt_storage_key)
        .bind(&row.receipt_file_name)
        .bind(&row.receipt_content_type)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieves an expense by id
    pub async fn get_by_id(&self, expense_id: Uuid) -> Result<ExpenseRow, DatabaseError> {
        let sql = format!("{SELECT_COLUMNS} WHERE expense_id = $1");
        sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(expense_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Expense", expense_id))
    }

    /// Finds expenses matching `filter`, ordered by submission time
    pub async fn find(&self, filter: &ExpenseFilter) -> Result<Vec<ExpenseRow>, DatabaseError> {
        let order = if filter.newest_first {
            "ORDER BY created_at DESC, expense_id DESC"
        } else {
            "ORDER BY created_at ASC, expense_id ASC"
        };
        let sql = format!("{SELECT_COLUMNS} {FIND_FILTER} {order}");

        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(filter.status)
            .bind(filter.claimant_ids.as_deref())
            .bind(filter.exported)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Rewrites the editable fields of a pending expense
    pub async fn update_pending(&self, row: &ExpenseRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE expenses SET
                description = $2,
                amount = $3,
                category = $4,
                expense_date = $5,
                policy_violations = $6,
                duplicate_receipt = $7,
                ai_violations = $8,
                receipt_storage_key = $9,
                receipt_file_name = $10,
                receipt_content_type = $11,
                updated_at = $12
            WHERE expense_id = $1 AND status = 'pending'
            "#,
        )
        .bind(row.expense_id)
        .bind(&row.description)
        .bind(row.amount)
        .bind(&row.category)
        .bind(row.expense_date)
        .bind(&row.policy_violations)
        .bind(row.duplicate_receipt)
        .bind(&row.ai_violations)
        .bind(&row.receipt_storage_key)
        .bind(&row.receipt_file_name)
        .bind(&row.receipt_content_type)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_write(row.expense_id).await);
        }
        Ok(())
    }

    /// Deletes a pending expense
    pub async fn delete_pending(&self, expense_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM expenses WHERE expense_id = $1 AND status = 'pending'")
            .bind(expense_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_write(expense_id).await);
        }
        Ok(())
    }

    /// Moves a pending expense to a terminal status
    ///
    /// Status, approver, timestamp and notes are written in one statement.
    pub async fn transition(&self, row: &ExpenseRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE expenses SET
                status = $2,
                approver_id = $3,
                approval_timestamp = $4,
                notes = $5,
                updated_at = NOW()
            WHERE expense_id = $1 AND status = 'pending'
            "#,
        )
        .bind(row.expense_id)
        .bind(row.status)
        .bind(row.approver_id)
        .bind(row.approval_timestamp)
        .bind(&row.notes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_write(row.expense_id).await);
        }
        Ok(())
    }

    /// Stamps `batch` on approved, unexported, unstaged rows among `ids`
    pub async fn stage_export_batch(
        &self,
        ids: &[Uuid],
        batch: &str,
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let staged = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE expenses SET export_batch = $2, updated_at = NOW()
            WHERE expense_id = ANY($1)
              AND status = 'approved'
              AND NOT exported_to_ledger
              AND export_batch IS NULL
            RETURNING expense_id
            "#,
        )
        .bind(ids)
        .bind(batch)
        .fetch_all(&self.pool)
        .await?;

        Ok(staged)
    }

    /// Flips the export flag on approved, unexported rows among `ids`
    pub async fn mark_exported(
        &self,
        ids: &[Uuid],
        ledger_record_id: &str,
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let marked = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE expenses SET
                exported_to_ledger = TRUE,
                ledger_record_id = $2,
                updated_at = NOW()
            WHERE expense_id = ANY($1)
              AND status = 'approved'
              AND NOT exported_to_ledger
            RETURNING expense_id
            "#,
        )
        .bind(ids)
        .bind(ledger_record_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(marked)
    }

    /// Distinguishes a missing row from one whose status moved on
    async fn explain_missed_write(&self, expense_id: Uuid) -> DatabaseError {
        let status = sqlx::query_scalar::<_, DbExpenseStatus>(
            "SELECT status FROM expenses WHERE expense_id = $1",
        )
        .bind(expense_id)
        .fetch_optional(&self.pool)
        .await;

        match status {
            Ok(None) => DatabaseError::not_found("Expense", expense_id),
            Ok(Some(status)) => DatabaseError::Conflict(format!(
                "expense {expense_id} is no longer pending ({status:?})"
            )),
            Err(e) => DatabaseError::from(e),
        }
    }
}
