//! Ledger DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use domain_export::{ExportFailure, ExportSuccess, ReconciliationReport, SchedulerState, SyncTrigger};
use infra_ledger::ConnectionStatus;

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub message: String,
    pub run_id: String,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exported_expenses: usize,
    pub successes: Vec<ExportSuccess>,
    pub failures: Vec<ExportFailure>,
    pub reauthorization_required: bool,
    pub cancelled: bool,
}

impl From<ReconciliationReport> for ExportResponse {
    fn from(report: ReconciliationReport) -> Self {
        Self {
            message: report.message(),
            run_id: report.run_id.to_string(),
            trigger: report.trigger,
            started_at: report.started_at,
            finished_at: report.finished_at,
            exported_expenses: report.exported_count(),
            reauthorization_required: report.requires_reauthorization(),
            cancelled: report.cancelled,
            successes: report.successes,
            failures: report.failures,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

/// Query string of the OAuth redirect
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub connected: bool,
    pub realm_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatus {
    pub state: SchedulerState,
    pub interval_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct LedgerStatusResponse {
    pub ledger: ConnectionStatus,
    pub sync: SyncStatus,
}
