//! Reconciliation reports

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{RunId, UserId};

/// What started a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTrigger::Scheduled => f.write_str("scheduled"),
            SyncTrigger::Manual => f.write_str("manual"),
        }
    }
}

/// A batch confirmed by the ledger and marked exported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSuccess {
    pub claimant_id: UserId,
    pub claimant_name: String,
    pub expense_count: usize,
    pub total_amount: Decimal,
    pub external_record_id: String,
    /// The ledger already held the record from an earlier attempt
    pub already_existed: bool,
}

/// A batch left unexported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportFailure {
    pub claimant_id: UserId,
    pub error_detail: String,
    pub reauthorization_required: bool,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: RunId,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub successes: Vec<ExportSuccess>,
    pub failures: Vec<ExportFailure>,
    /// The pass stopped early between batches
    pub cancelled: bool,
}

impl ReconciliationReport {
    pub(crate) fn start(trigger: SyncTrigger) -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::new_v7(),
            trigger,
            started_at: now,
            finished_at: now,
            successes: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// True when no batch was attempted
    pub fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }

    /// Human-readable summary
    pub fn message(&self) -> String {
        if self.is_empty() {
            return "Nothing to export".to_string();
        }
        format!(
            "Exported {} of {} batches ({} expenses)",
            self.successes.len(),
            self.successes.len() + self.failures.len(),
            self.exported_count()
        )
    }

    /// Number of expenses marked exported by this pass
    pub fn exported_count(&self) -> usize {
        self.successes.iter().map(|s| s.expense_count).sum()
    }

    /// True when any batch failed because the ledger connection must be
    /// re-authorized
    pub fn requires_reauthorization(&self) -> bool {
        self.failures.iter().any(|f| f.reauthorization_required)
    }
}
