//! Approval authority
//!
//! Decides which pending expenses a reviewer may see and act on, and
//! performs the Pending -> Approved/Rejected transition through the store's
//! compare-and-set write.
//!
//! # Team scoping
//!
//! | Actor role | Visible pending expenses                          | May act on                                  |
//! |------------|---------------------------------------------------|---------------------------------------------|
//! | finance    | all                                               | all                                         |
//! | manager    | team members' expenses, or per `EmptyTeamPolicy` | claimants with no manager, or own reports   |
//! | employee   | none (Forbidden)                                  | none (Forbidden)                            |

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{ExpenseId, UserId};
use crate::error::ExpenseError;
use crate::expense::Expense;
use crate::ports::{ExpenseQuery, ExpenseStore, UserDirectory};
use crate::user::{Actor, Role, User};

/// What a manager without declared team members may see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTeamPolicy {
    /// Every pending expense is visible
    #[default]
    AllPending,
    /// Nothing is visible until a team is declared
    NoneVisible,
}

/// Approval configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub empty_team_policy: EmptyTeamPolicy,
}

/// Enforces who may review an expense and performs the review transitions
pub struct ApprovalAuthority {
    store: Arc<dyn ExpenseStore>,
    users: Arc<dyn UserDirectory>,
    config: ApprovalConfig,
}

impl ApprovalAuthority {
    pub fn new(
        store: Arc<dyn ExpenseStore>,
        users: Arc<dyn UserDirectory>,
        config: ApprovalConfig,
    ) -> Self {
        Self { store, users, config }
    }

    /// Lists the pending expenses visible to `actor`, newest first
    pub async fn list_pending(&self, actor: &Actor) -> Result<Vec<Expense>, ExpenseError> {
        ensure_reviewer(actor)?;

        let query = match actor.role {
            Role::Manager => {
                let team = self.users.team_members(actor.id).await?;
                if team.is_empty() {
                    match self.config.empty_team_policy {
                        EmptyTeamPolicy::AllPending => ExpenseQuery::pending(),
                        EmptyTeamPolicy::NoneVisible => return Ok(Vec::new()),
                    }
                } else {
                    ExpenseQuery::pending().for_claimants(team.into_iter().map(|u| u.id).collect())
                }
            }
            _ => ExpenseQuery::pending(),
        };

        Ok(self.store.find(query).await?)
    }

    /// Approves a pending expense
    pub async fn approve(
        &self,
        actor: &Actor,
        id: ExpenseId,
        notes: Option<&str>,
    ) -> Result<Expense, ExpenseError> {
        ensure_reviewer(actor)?;
        let mut expense = self.load(id).await?;
        if expense.is_terminal() {
            return Err(ExpenseError::InvalidState {
                action: "approve",
                status: expense.status,
            });
        }
        self.ensure_may_act(actor, &expense, "approve").await?;

        expense.approve(actor.id, notes, Utc::now())?;
        self.commit(&expense).await?;

        info!(expense_id = %id, approver = %actor.id, "Expense approved");
        Ok(expense)
    }

    /// Rejects a pending expense; `notes` carries the mandatory reason
    pub async fn reject(
        &self,
        actor: &Actor,
        id: ExpenseId,
        notes: &str,
    ) -> Result<Expense, ExpenseError> {
        if notes.trim().is_empty() {
            return Err(ExpenseError::Validation("Rejection reason is required".to_string()));
        }
        ensure_reviewer(actor)?;
        let mut expense = self.load(id).await?;
        if expense.is_terminal() {
            return Err(ExpenseError::InvalidState {
                action: "reject",
                status: expense.status,
            });
        }
        self.ensure_may_act(actor, &expense, "reject").await?;

        expense.reject(actor.id, notes, Utc::now())?;
        self.commit(&expense).await?;

        info!(expense_id = %id, approver = %actor.id, "Expense rejected");
        Ok(expense)
    }

    async fn load(&self, id: ExpenseId) -> Result<Expense, ExpenseError> {
        self.store
            .get(id)
            .await
            .map_err(|e| ExpenseError::from_store(id, e))
    }

    async fn commit(&self, expense: &Expense) -> Result<(), ExpenseError> {
        self.store.transition(expense).await.map_err(|e| {
            let error = ExpenseError::from_store(expense.id, e);
            if matches!(error, ExpenseError::ConcurrencyConflict(_)) {
                warn!(expense_id = %expense.id, "Lost review race");
            }
            error
        })
    }

    async fn ensure_may_act(
        &self,
        actor: &Actor,
        expense: &Expense,
        action: &str,
    ) -> Result<(), ExpenseError> {
        if actor.role != Role::Manager {
            return Ok(());
        }
        let claimant = self.users.get_user(expense.claimant_id).await?;
        if manager_may_act(actor.id, claimant.as_ref()) {
            Ok(())
        } else {
            Err(ExpenseError::Forbidden(format!(
                "You can only {action} expenses from your team members"
            )))
        }
    }
}

/// Team-scoping rule for managers
///
/// A manager may act when the claimant has no declared manager (or is not
/// known to the directory), or when the manager is the claimant's manager.
pub fn manager_may_act(manager_id: UserId, claimant: Option<&User>) -> bool {
    match claimant.and_then(|c| c.manager_id) {
        None => true,
        Some(declared) => declared == manager_id,
    }
}

fn ensure_reviewer(actor: &Actor) -> Result<(), ExpenseError> {
    if actor.role.can_review() {
        Ok(())
    } else {
        Err(ExpenseError::Forbidden(format!(
            "Role '{}' cannot review expenses",
            actor.role
        )))
    }
}
