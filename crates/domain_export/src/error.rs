//! Export domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Failures reported by the external ledger
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger authorization is no longer valid, reconnect required: {0}")]
    ReauthorizationRequired(String),

    #[error("Ledger is not connected")]
    NotConnected,

    #[error("Authorization state mismatch")]
    InvalidState,

    #[error("Ledger call timed out after {0} ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ledger rate limit reached")]
    RateLimited,

    #[error("Ledger service unavailable (HTTP {0})")]
    ServiceUnavailable(u16),

    #[error("Ledger rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// True when retrying later may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Timeout(_)
                | LedgerError::Network(_)
                | LedgerError::RateLimited
                | LedgerError::ServiceUnavailable(_)
        )
    }

    /// True when an operator must repeat the consent flow
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, LedgerError::ReauthorizationRequired(_) | LedgerError::NotConnected)
    }
}

/// Errors that abort a whole reconciliation pass
///
/// Per-batch failures never surface here; they are recorded in the report.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Store error: {0}")]
    Store(#[from] PortError),

    #[error("Reconciliation cancelled")]
    Cancelled,
}
