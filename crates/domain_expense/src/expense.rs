//! Expense aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Amount, ExpenseId, UserId};
use crate::error::ExpenseError;
use crate::policy::{ExternalSignals, PolicyEvaluator};

/// Separator between entries of the notes log
const NOTES_SEPARATOR: &str = "\n\n";

/// Label prepended to approval notes
pub const APPROVAL_NOTES_LABEL: &str = "Approval notes";

/// Label prepended to rejection reasons
pub const REJECTION_REASON_LABEL: &str = "Rejection reason";

/// Expense status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseStatus {
    /// Awaiting review
    Pending,
    /// Approved for reimbursement
    Approved,
    /// Rejected by a reviewer
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "Pending",
            ExpenseStatus::Approved => "Approved",
            ExpenseStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExpenseStatus::Pending)
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExpenseStatus::Pending),
            "Approved" => Ok(ExpenseStatus::Approved),
            "Rejected" => Ok(ExpenseStatus::Rejected),
            other => Err(format!("unknown expense status: {other}")),
        }
    }
}

/// Expense category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Travel,
    Meals,
    #[serde(rename = "Office Supplies")]
    OfficeSupplies,
    Equipment,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 5] = [
        ExpenseCategory::Travel,
        ExpenseCategory::Meals,
        ExpenseCategory::OfficeSupplies,
        ExpenseCategory::Equipment,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Travel => "Travel",
            ExpenseCategory::Meals => "Meals",
            ExpenseCategory::OfficeSupplies => "Office Supplies",
            ExpenseCategory::Equipment => "Equipment",
            ExpenseCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpenseCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown expense category: {s}"))
    }
}

/// Reference to receipt bytes held by the file storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRef {
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
}

/// Input for a new expense claim
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub claimant_id: UserId,
    pub description: String,
    pub amount: Amount,
    pub category: ExpenseCategory,
    pub expense_date: NaiveDate,
    pub notes: Option<String>,
    pub receipt: Option<ReceiptRef>,
    pub signals: ExternalSignals,
}

/// Edits to a pending expense; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ExpenseRevision {
    pub description: Option<String>,
    pub amount: Option<Amount>,
    pub category: Option<ExpenseCategory>,
    pub expense_date: Option<NaiveDate>,
    pub receipt: Option<ReceiptRef>,
    pub signals: Option<ExternalSignals>,
}

/// An expense claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Unique identifier
    pub id: ExpenseId,
    /// Submitting user
    pub claimant_id: UserId,
    /// Description shown to reviewers and on the ledger line
    pub description: String,
    /// Claimed amount
    pub amount: Amount,
    /// Category
    pub category: ExpenseCategory,
    /// Date the cost was incurred
    pub expense_date: NaiveDate,
    /// Status
    pub status: ExpenseStatus,
    /// Advisory policy violations, frozen once terminal
    pub policy_violations: Vec<String>,
    /// Signals the violations were computed from
    pub signals: ExternalSignals,
    /// Reviewer who performed the terminal transition
    pub approver_id: Option<UserId>,
    /// Time of the terminal transition
    pub approval_timestamp: Option<DateTime<Utc>>,
    /// Append-only annotation log
    pub notes: Option<String>,
    /// Set once the ledger confirmed the write
    pub exported_to_ledger: bool,
    /// Idempotency key of the ledger batch this expense was staged into
    pub export_batch: Option<String>,
    /// External record created for the batch
    pub ledger_record_id: Option<String>,
    /// Receipt reference
    pub receipt: Option<ReceiptRef>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Creates a new pending expense and evaluates it against the policy
    pub fn submit(new: NewExpense, evaluator: &PolicyEvaluator) -> Result<Self, ExpenseError> {
        let description = new.description.trim().to_string();
        if description.is_empty() {
            return Err(ExpenseError::Validation("Description is required".to_string()));
        }

        let now = Utc::now();
        let policy_violations = evaluator.evaluate(new.amount, new.category, &new.signals);

        Ok(Self {
            id: ExpenseId::new_v7(),
            claimant_id: new.claimant_id,
            description,
            amount: new.amount,
            category: new.category,
            expense_date: new.expense_date,
            status: ExpenseStatus::Pending,
            policy_violations,
            signals: new.signals,
            approver_id: None,
            approval_timestamp: None,
            notes: new.notes.filter(|n| !n.trim().is_empty()),
            exported_to_ledger: false,
            export_batch: None,
            ledger_record_id: None,
            receipt: new.receipt,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies edits to a pending expense and re-evaluates the policy
    pub fn revise(
        &mut self,
        revision: ExpenseRevision,
        evaluator: &PolicyEvaluator,
    ) -> Result<(), ExpenseError> {
        self.ensure_pending("edit")?;

        if let Some(description) = revision.description {
            let description = description.trim().to_string();
            if description.is_empty() {
                return Err(ExpenseError::Validation("Description is required".to_string()));
            }
            self.description = description;
        }
        if let Some(amount) = revision.amount {
            self.amount = amount;
        }
        if let Some(category) = revision.category {
            self.category = category;
        }
        if let Some(date) = revision.expense_date {
            self.expense_date = date;
        }
        if let Some(receipt) = revision.receipt {
            self.receipt = Some(receipt);
        }
        if let Some(signals) = revision.signals {
            self.signals = signals;
        }

        self.policy_violations = evaluator.evaluate(self.amount, self.category, &self.signals);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Approves a pending expense
    pub fn approve(
        &mut self,
        approver: UserId,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), ExpenseError> {
        self.ensure_pending("approve")?;
        self.finalize(ExpenseStatus::Approved, approver, at);
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            self.append_note(APPROVAL_NOTES_LABEL, notes);
        }
        Ok(())
    }

    /// Rejects a pending expense; a reason is mandatory
    pub fn reject(
        &mut self,
        approver: UserId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ExpenseError> {
        if reason.trim().is_empty() {
            return Err(ExpenseError::Validation("Rejection reason is required".to_string()));
        }
        self.ensure_pending("reject")?;
        self.finalize(ExpenseStatus::Rejected, approver, at);
        self.append_note(REJECTION_REASON_LABEL, reason);
        Ok(())
    }

    /// Checks the expense may still be deleted
    pub fn ensure_deletable(&self) -> Result<(), ExpenseError> {
        self.ensure_pending("delete")
    }

    /// Records the export batch this expense is being written under
    pub fn stage_for_export(&mut self, batch: &str) -> Result<(), ExpenseError> {
        self.ensure_exportable()?;
        if self.export_batch.is_none() {
            self.export_batch = Some(batch.to_string());
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Marks the expense as written to the ledger
    pub fn mark_exported(&mut self, ledger_record_id: &str) -> Result<(), ExpenseError> {
        self.ensure_exportable()?;
        self.exported_to_ledger = true;
        self.ledger_record_id = Some(ledger_record_id.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True when the expense is approved and not yet exported
    pub fn is_exportable(&self) -> bool {
        self.status == ExpenseStatus::Approved && !self.exported_to_ledger
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_receipt(&self) -> bool {
        self.receipt.is_some()
    }

    pub fn has_violations(&self) -> bool {
        !self.policy_violations.is_empty()
    }

    fn ensure_pending(&self, action: &'static str) -> Result<(), ExpenseError> {
        if self.status != ExpenseStatus::Pending {
            return Err(ExpenseError::InvalidState {
                action,
                status: self.status,
            });
        }
        Ok(())
    }

    fn ensure_exportable(&self) -> Result<(), ExpenseError> {
        if self.status != ExpenseStatus::Approved {
            return Err(ExpenseError::InvalidState {
                action: "export",
                status: self.status,
            });
        }
        if self.exported_to_ledger {
            return Err(ExpenseError::AlreadyExported(self.id));
        }
        Ok(())
    }

    fn finalize(&mut self, status: ExpenseStatus, approver: UserId, at: DateTime<Utc>) {
        self.status = status;
        self.approver_id = Some(approver);
        self.approval_timestamp = Some(at);
        self.updated_at = at;
    }

    fn append_note(&mut self, label: &str, text: &str) {
        let entry = format!("{}: {}", label, text.trim());
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => {
                format!("{existing}{NOTES_SEPARATOR}{entry}")
            }
            _ => entry,
        });
    }
}
