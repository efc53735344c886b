//! Claimant-facing expense operations
//!
//! Submission, edits and deletion. Review transitions go through
//! [`ApprovalAuthority`](crate::approval::ApprovalAuthority).

use std::sync::Arc;

use tracing::{debug, info};

use core_kernel::{ExpenseId, UserId};
use crate::error::ExpenseError;
use crate::expense::{Expense, ExpenseRevision, NewExpense};
use crate::policy::PolicyEvaluator;
use crate::ports::ExpenseStore;

/// Service for submitting and maintaining expense claims
pub struct ExpenseService {
    store: Arc<dyn ExpenseStore>,
    evaluator: PolicyEvaluator,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn ExpenseStore>, evaluator: PolicyEvaluator) -> Self {
        Self { store, evaluator }
    }

    /// Submits a new claim; policy violations are recorded, never enforced
    pub async fn submit(&self, new: NewExpense) -> Result<Expense, ExpenseError> {
        let expense = Expense::submit(new, &self.evaluator)?;
        self.store.insert(&expense).await?;

        info!(
            expense_id = %expense.id,
            claimant = %expense.claimant_id,
            amount = %expense.amount,
            violations = expense.policy_violations.len(),
            "Expense submitted"
        );
        Ok(expense)
    }

    /// Retrieves an expense
    pub async fn get(&self, id: ExpenseId) -> Result<Expense, ExpenseError> {
        self.store
            .get(id)
            .await
            .map_err(|e| ExpenseError::from_store(id, e))
    }

    /// Edits a pending claim owned by `claimant`
    pub async fn revise(
        &self,
        claimant: UserId,
        id: ExpenseId,
        revision: ExpenseRevision,
    ) -> Result<Expense, ExpenseError> {
        let mut expense = self.owned(claimant, id).await?;
        expense.revise(revision, &self.evaluator)?;
        self.store
            .update_pending(&expense)
            .await
            .map_err(|e| ExpenseError::from_store(id, e))?;

        debug!(expense_id = %id, "Expense revised");
        Ok(expense)
    }

    /// Deletes a pending claim owned by `claimant`
    pub async fn delete(&self, claimant: UserId, id: ExpenseId) -> Result<(), ExpenseError> {
        let expense = self.owned(claimant, id).await?;
        expense.ensure_deletable()?;
        self.store
            .delete_pending(id)
            .await
            .map_err(|e| ExpenseError::from_store(id, e))?;

        info!(expense_id = %id, "Expense deleted");
        Ok(())
    }

    async fn owned(&self, claimant: UserId, id: ExpenseId) -> Result<Expense, ExpenseError> {
        let expense = self.get(id).await?;
        if expense.claimant_id != claimant {
            return Err(ExpenseError::Forbidden(
                "Only the claimant may change this expense".to_string(),
            ));
        }
        Ok(expense)
    }
}
