//! Expense Domain Ports
//!
//! This module defines the port interfaces the expense domain needs from its
//! collaborators:
//!
//! - **ExpenseStore**: persistence of expense records with conditional
//!   (compare-and-set) writes so that concurrent reviewers cannot both win
//! - **UserDirectory**: read-only access to the identity collaborator
//!
//! Adapters live in `infra_db` (PostgreSQL); the in-memory adapters in the
//! `mock` module back the unit tests and the other crates' test suites.

use async_trait::async_trait;

use core_kernel::{DomainPort, ExpenseId, HealthCheckable, PortError, UserId};

use crate::expense::{Expense, ExpenseStatus};
use crate::user::User;

/// Result ordering for expense queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first (submission order)
    #[default]
    OldestFirst,
    /// Newest first
    NewestFirst,
}

/// Query parameters for finding expenses
#[derive(Debug, Clone, Default)]
pub struct ExpenseQuery {
    /// Filter by status
    pub status: Option<ExpenseStatus>,
    /// Restrict to these claimants
    pub claimants: Option<Vec<UserId>>,
    /// Filter by ledger export flag
    pub exported: Option<bool>,
    /// Ordering by submission time
    pub order: SortOrder,
}

impl ExpenseQuery {
    /// All pending expenses, newest first
    pub fn pending() -> Self {
        Self {
            status: Some(ExpenseStatus::Pending),
            order: SortOrder::NewestFirst,
            ..Default::default()
        }
    }

    /// Approved expenses not yet written to the ledger, in submission order
    pub fn awaiting_export() -> Self {
        Self {
            status: Some(ExpenseStatus::Approved),
            exported: Some(false),
            order: SortOrder::OldestFirst,
            ..Default::default()
        }
    }

    /// Restricts the query to a set of claimants
    pub fn for_claimants(mut self, claimants: Vec<UserId>) -> Self {
        self.claimants = Some(claimants);
        self
    }

    /// Checks whether an expense satisfies the filters
    pub fn matches(&self, expense: &Expense) -> bool {
        if let Some(status) = self.status {
            if expense.status != status {
                return false;
            }
        }
        if let Some(ref claimants) = self.claimants {
            if !claimants.contains(&expense.claimant_id) {
                return false;
            }
        }
        if let Some(exported) = self.exported {
            if expense.exported_to_ledger != exported {
                return false;
            }
        }
        true
    }
}

/// Persistence port for expense records
///
/// All writes after submission are conditional on the stored state so that
/// concurrent callers observe a `PortError::Conflict` instead of silently
/// overwriting each other.
#[async_trait]
pub trait ExpenseStore: DomainPort + HealthCheckable {
    /// Inserts a newly submitted expense
    async fn insert(&self, expense: &Expense) -> Result<(), PortError>;

    /// Retrieves an expense by id
    async fn get(&self, id: ExpenseId) -> Result<Expense, PortError>;

    /// Finds expenses matching the query
    async fn find(&self, query: ExpenseQuery) -> Result<Vec<Expense>, PortError>;

    /// Replaces the editable fields of an expense that is still pending
    async fn update_pending(&self, expense: &Expense) -> Result<(), PortError>;

    /// Deletes an expense that is still pending
    async fn delete_pending(&self, id: ExpenseId) -> Result<(), PortError>;

    /// Writes a terminal transition if, and only if, the stored status is
    /// still Pending. Status, approver, timestamp and notes are written
    /// together.
    async fn transition(&self, expense: &Expense) -> Result<(), PortError>;

    /// Stamps the batch key on approved, unexported, unstaged expenses among
    /// `ids`; returns the ids actually stamped
    async fn stage_export_batch(
        &self,
        ids: &[ExpenseId],
        batch: &str,
    ) -> Result<Vec<ExpenseId>, PortError>;

    /// Atomically flips `exported_to_ledger` for approved, unexported
    /// expenses among `ids`; returns the ids actually flipped
    async fn mark_exported(
        &self,
        ids: &[ExpenseId],
        ledger_record_id: &str,
    ) -> Result<Vec<ExpenseId>, PortError>;
}

/// Read-only port onto the identity collaborator
#[async_trait]
pub trait UserDirectory: DomainPort {
    /// Retrieves a user, `None` if unknown
    async fn get_user(&self, id: UserId) -> Result<Option<User>, PortError>;

    /// Users whose declared manager is `manager_id`
    async fn team_members(&self, manager_id: UserId) -> Result<Vec<User>, PortError>;
}

/// In-memory adapters for testing
///
/// These adapters keep records in memory and are useful for unit testing
/// without database dependencies.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use chrono::Utc;
    use core_kernel::HealthCheckResult;
    use tokio::sync::RwLock;

    /// In-memory expense store
    ///
    /// Records are kept in submission order so queries are deterministic.
    #[derive(Debug, Default)]
    pub struct InMemoryExpenseStore {
        expenses: Arc<RwLock<Vec<Expense>>>,
        fail_mark_exported: AtomicBool,
        mark_calls: AtomicUsize,
    }

    impl InMemoryExpenseStore {
        /// Creates an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with expenses for testing
        pub async fn with_expenses(expenses: Vec<Expense>) -> Self {
            let store = Self::new();
            store.expenses.write().await.extend(expenses);
            store
        }

        /// Makes every subsequent `mark_exported` call fail
        pub fn fail_mark_exported(&self, fail: bool) {
            self.fail_mark_exported.store(fail, Ordering::SeqCst);
        }

        /// Number of `mark_exported` calls so far
        pub fn mark_exported_calls(&self) -> usize {
            self.mark_calls.load(Ordering::SeqCst)
        }

        /// Snapshot of every stored expense
        pub async fn all(&self) -> Vec<Expense> {
            self.expenses.read().await.clone()
        }
    }

    impl DomainPort for InMemoryExpenseStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryExpenseStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("in-memory-expense-store", 0)
        }
    }

    #[async_trait]
    impl ExpenseStore for InMemoryExpenseStore {
        async fn insert(&self, expense: &Expense) -> Result<(), PortError> {
            let mut expenses = self.expenses.write().await;
            if expenses.iter().any(|e| e.id == expense.id) {
                return Err(PortError::conflict(format!("expense {} already exists", expense.id)));
            }
            expenses.push(expense.clone());
            Ok(())
        }

        async fn get(&self, id: ExpenseId) -> Result<Expense, PortError> {
            self.expenses
                .read()
                .await
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Expense", id))
        }

        async fn find(&self, query: ExpenseQuery) -> Result<Vec<Expense>, PortError> {
            let expenses = self.expenses.read().await;
            let mut results: Vec<_> = expenses.iter().filter(|e| query.matches(e)).cloned().collect();
            if query.order == SortOrder::NewestFirst {
                results.reverse();
            }
            Ok(results)
        }

        async fn update_pending(&self, expense: &Expense) -> Result<(), PortError> {
            let mut expenses = self.expenses.write().await;
            let stored = expenses
                .iter_mut()
                .find(|e| e.id == expense.id)
                .ok_or_else(|| PortError::not_found("Expense", expense.id))?;
            if stored.status != ExpenseStatus::Pending {
                return Err(PortError::conflict(format!("expense {} is {}", expense.id, stored.status)));
            }
            *stored = Expense {
                status: ExpenseStatus::Pending,
                ..expense.clone()
            };
            Ok(())
        }

        async fn delete_pending(&self, id: ExpenseId) -> Result<(), PortError> {
            let mut expenses = self.expenses.write().await;
            let index = expenses
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| PortError::not_found("Expense", id))?;
            if expenses[index].status != ExpenseStatus::Pending {
                return Err(PortError::conflict(format!("expense {} is {}", id, expenses[index].status)));
            }
            expenses.remove(index);
            Ok(())
        }

        async fn transition(&self, expense: &Expense) -> Result<(), PortError> {
            let mut expenses = self.expenses.write().await;
            let stored = expenses
                .iter_mut()
                .find(|e| e.id == expense.id)
                .ok_or_else(|| PortError::not_found("Expense", expense.id))?;
            if stored.status != ExpenseStatus::Pending {
                return Err(PortError::conflict(format!("expense {} is already {}", expense.id, stored.status)));
            }
            stored.status = expense.status;
            stored.approver_id = expense.approver_id;
            stored.approval_timestamp = expense.approval_timestamp;
            stored.notes = expense.notes.clone();
            stored.updated_at = Utc::now();
            Ok(())
        }

        async fn stage_export_batch(
            &self,
            ids: &[ExpenseId],
            batch: &str,
        ) -> Result<Vec<ExpenseId>, PortError> {
            let mut expenses = self.expenses.write().await;
            let mut staged = Vec::new();
            for expense in expenses.iter_mut() {
                if ids.contains(&expense.id) && expense.is_exportable() && expense.export_batch.is_none() {
                    expense.export_batch = Some(batch.to_string());
                    expense.updated_at = Utc::now();
                    staged.push(expense.id);
                }
            }
            Ok(staged)
        }

        async fn mark_exported(
            &self,
            ids: &[ExpenseId],
            ledger_record_id: &str,
        ) -> Result<Vec<ExpenseId>, PortError> {
            self.mark_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_mark_exported.load(Ordering::SeqCst) {
                return Err(PortError::connection("simulated store outage"));
            }

            let mut expenses = self.expenses.write().await;
            let mut marked = Vec::new();
            for expense in expenses.iter_mut() {
                if ids.contains(&expense.id) && expense.mark_exported(ledger_record_id).is_ok() {
                    marked.push(expense.id);
                }
            }
            Ok(marked)
        }
    }

    /// In-memory identity directory
    #[derive(Debug, Default)]
    pub struct InMemoryUserDirectory {
        users: RwLock<HashMap<UserId, User>>,
    }

    impl InMemoryUserDirectory {
        /// Creates an empty directory
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with users for testing
        pub async fn with_users(users: Vec<User>) -> Self {
            let directory = Self::new();
            for user in users {
                directory.insert(user).await;
            }
            directory
        }

        /// Adds or replaces a user
        pub async fn insert(&self, user: User) {
            self.users.write().await.insert(user.id, user);
        }
    }

    impl DomainPort for InMemoryUserDirectory {}

    #[async_trait]
    impl UserDirectory for InMemoryUserDirectory {
        async fn get_user(&self, id: UserId) -> Result<Option<User>, PortError> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn team_members(&self, manager_id: UserId) -> Result<Vec<User>, PortError> {
            Ok(self
                .users
                .read()
                .await
                .values()
                .filter(|u| u.manager_id == Some(manager_id))
                .cloned()
                .collect())
        }
    }
}
