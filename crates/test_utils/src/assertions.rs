//! Custom Test Assertions
//!
//! Assertion helpers for expense records with messages that name the
//! offending field.

use core_kernel::UserId;
use domain_expense::{Expense, ExpenseStatus};

/// Asserts the violation list, order included
pub fn assert_violations(expense: &Expense, expected: &[&str]) {
    let actual: Vec<&str> = expense.policy_violations.iter().map(String::as_str).collect();
    assert_eq!(
        actual, expected,
        "Violation mismatch for expense {}",
        expense.id
    );
}

/// Asserts that the expense was reviewed into `status` by `approver`
///
/// Status, approver and timestamp are checked together since they are
/// only ever written together.
pub fn assert_reviewed(expense: &Expense, status: ExpenseStatus, approver: UserId) {
    assert_eq!(expense.status, status, "Unexpected status for expense {}", expense.id);
    assert_eq!(
        expense.approver_id,
        Some(approver),
        "Unexpected approver for expense {}",
        expense.id
    );
    assert!(
        expense.approval_timestamp.is_some(),
        "Expense {} is {} but has no approval timestamp",
        expense.id,
        status
    );
}

/// Asserts that the expense is still awaiting review
pub fn assert_pending(expense: &Expense) {
    assert_eq!(expense.status, ExpenseStatus::Pending, "Expense {} is not pending", expense.id);
    assert!(
        expense.approver_id.is_none() && expense.approval_timestamp.is_none(),
        "Pending expense {} carries review fields",
        expense.id
    );
}

/// Asserts that the expense was written to the ledger as `record_id`
pub fn assert_exported(expense: &Expense, record_id: &str) {
    assert!(
        expense.exported_to_ledger,
        "Expense {} was not marked exported",
        expense.id
    );
    assert_eq!(
        expense.ledger_record_id.as_deref(),
        Some(record_id),
        "Unexpected ledger record for expense {}",
        expense.id
    );
}

/// Asserts that the expense is approved and still awaiting export
pub fn assert_awaiting_export(expense: &Expense) {
    assert_eq!(expense.status, ExpenseStatus::Approved, "Expense {} is not approved", expense.id);
    assert!(
        !expense.exported_to_ledger,
        "Expense {} was already exported as {:?}",
        expense.id,
        expense.ledger_record_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::ExpenseBuilder;
    use crate::fixtures::AmountFixtures;

    #[test]
    fn test_assertions_accept_matching_records() {
        let approver = UserId::new_v7();
        let expense = ExpenseBuilder::new(UserId::new_v7())
            .amount(AmountFixtures::over_limit())
            .approved_by(approver)
            .build();

        assert_violations(&expense, &[domain_expense::AMOUNT_LIMIT_VIOLATION]);
        assert_reviewed(&expense, ExpenseStatus::Approved, approver);
        assert_awaiting_export(&expense);
    }

    #[test]
    #[should_panic(expected = "not pending")]
    fn test_assert_pending_rejects_reviewed_expense() {
        let expense = ExpenseBuilder::new(UserId::new_v7())
            .rejected_by(UserId::new_v7(), "No receipt")
            .build();
        assert_pending(&expense);
    }
}
