//! Expense DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_expense::{Expense, ExpenseCategory, ExternalSignals, ReceiptRef, User};

/// Receipt metadata; the bytes live with the file storage service
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiptDto {
    #[validate(length(min = 1))]
    pub storage_key: String,
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1))]
    pub content_type: String,
}

impl From<ReceiptDto> for ReceiptRef {
    fn from(dto: ReceiptDto) -> Self {
        ReceiptRef {
            storage_key: dto.storage_key,
            file_name: dto.file_name,
            content_type: dto.content_type,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitExpenseRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub amount: Decimal,
    pub category: ExpenseCategory,
    pub expense_date: NaiveDate,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(nested)]
    pub receipt: Option<ReceiptDto>,
    /// Output of receipt analysis, if it ran
    #[serde(default)]
    pub signals: ExternalSignals,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReviseExpenseRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<ExpenseCategory>,
    pub expense_date: Option<NaiveDate>,
    #[validate(nested)]
    pub receipt: Option<ReceiptDto>,
    pub signals: Option<ExternalSignals>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 2000, message = "A rejection reason is required"))]
    pub notes: String,
}

/// Who submitted an expense
#[derive(Debug, Serialize)]
pub struct ClaimantSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
}

impl From<&User> for ClaimantSummary {
    fn from(user: &User) -> Self {
        Self {
            id: *user.id.as_uuid(),
            name: user.display_name().to_string(),
            email: user.email.clone(),
            department: user.department.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptSummary {
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub claimant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimant: Option<ClaimantSummary>,
    pub description: String,
    pub amount: Decimal,
    pub category: ExpenseCategory,
    pub expense_date: NaiveDate,
    pub status: String,
    pub policy_violations: Vec<String>,
    pub approver_id: Option<Uuid>,
    pub approval_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub exported_to_ledger: bool,
    pub ledger_record_id: Option<String>,
    pub has_receipt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseResponse {
    pub fn with_claimant(mut self, claimant: Option<&User>) -> Self {
        self.claimant = claimant.map(ClaimantSummary::from);
        self
    }

    /// Keeps only `has_receipt`; review queues do not expose receipt metadata
    pub fn without_receipt_details(mut self) -> Self {
        self.receipt = None;
        self
    }
}

impl From<Expense> for ExpenseResponse {
    fn from(expense: Expense) -> Self {
        Self {
            id: *expense.id.as_uuid(),
            claimant_id: *expense.claimant_id.as_uuid(),
            claimant: None,
            has_receipt: expense.has_receipt(),
            receipt: expense.receipt.map(|r| ReceiptSummary {
                file_name: r.file_name,
                content_type: r.content_type,
            }),
            description: expense.description,
            amount: expense.amount.value(),
            category: expense.category,
            expense_date: expense.expense_date,
            status: expense.status.to_string(),
            policy_violations: expense.policy_violations,
            approver_id: expense.approver_id.map(|id| *id.as_uuid()),
            approval_timestamp: expense.approval_timestamp,
            notes: expense.notes,
            exported_to_ledger: expense.exported_to_ledger,
            ledger_record_id: expense.ledger_record_id,
            created_at: expense.created_at,
            updated_at: expense.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}
