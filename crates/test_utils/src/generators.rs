//! Property-Based Test Generators
//!
//! Proptest strategies producing values that respect the domain invariants.

use chrono::NaiveDate;
use core_kernel::{Amount, UserId};
use domain_expense::{Expense, ExpenseCategory, ExternalSignals};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::builders::ExpenseBuilder;

/// Strategy for amounts in minor units, 0.01 up to 10 000.00
pub fn amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000i64
}

/// Strategy for valid amounts
pub fn amount_strategy() -> impl Strategy<Value = Amount> {
    amount_minor_strategy().prop_map(|minor| {
        Amount::from_minor(minor).expect("strategy yields positive amounts")
    })
}

/// Strategy for decimals that are not valid amounts (zero or negative)
pub fn non_positive_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..=0i64).prop_map(|minor| Decimal::new(minor, 2))
}

pub fn category_strategy() -> impl Strategy<Value = ExpenseCategory> {
    prop::sample::select(ExpenseCategory::ALL.to_vec())
}

/// Strategy for dates in 2020 through 2027
pub fn expense_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2028, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("day 1-28 exists"))
}

/// Strategy for external signals with up to three violation messages
pub fn signals_strategy() -> impl Strategy<Value = ExternalSignals> {
    (any::<bool>(), prop::collection::vec("[A-Za-z ]{3,24}", 0..3)).prop_map(
        |(duplicate_receipt, ai_violations)| ExternalSignals {
            duplicate_receipt,
            ai_violations,
        },
    )
}

/// Strategy for pending expenses belonging to `claimant_id`
pub fn pending_expense_strategy(claimant_id: UserId) -> impl Strategy<Value = Expense> {
    (
        amount_strategy(),
        category_strategy(),
        expense_date_strategy(),
        signals_strategy(),
    )
        .prop_map(move |(amount, category, date, signals)| {
            ExpenseBuilder::new(claimant_id)
                .amount(amount)
                .category(category)
                .expense_date(date)
                .signals(signals)
                .build()
        })
}
