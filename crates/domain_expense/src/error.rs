//! Expense domain errors

use thiserror::Error;

use core_kernel::{AmountError, ExpenseId, PortError};
use crate::expense::ExpenseStatus;

/// Errors that can occur in the expense domain
#[derive(Debug, Error)]
pub enum ExpenseError {
    #[error("Expense not found: {0}")]
    NotFound(ExpenseId),

    #[error("Cannot {action} an expense with status: {status}")]
    InvalidState {
        action: &'static str,
        status: ExpenseStatus,
    },

    #[error("Expense {0} has already been exported to the ledger")]
    AlreadyExported(ExpenseId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Expense {0} was modified concurrently")]
    ConcurrencyConflict(ExpenseId),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

impl ExpenseError {
    /// Maps a store error for a specific expense onto the domain taxonomy
    pub(crate) fn from_store(id: ExpenseId, error: PortError) -> Self {
        match error {
            PortError::NotFound { .. } => ExpenseError::NotFound(id),
            PortError::Conflict { .. } => ExpenseError::ConcurrencyConflict(id),
            other => ExpenseError::Store(other),
        }
    }

    /// True for errors caused by the record's current lifecycle state
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            ExpenseError::InvalidState { .. }
                | ExpenseError::AlreadyExported(_)
                | ExpenseError::ConcurrencyConflict(_)
        )
    }
}
