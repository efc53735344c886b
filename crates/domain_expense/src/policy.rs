//! Expense policy evaluation
//!
//! Policy violations are advisory: they never block submission, they only
//! annotate the claim for the human reviewer.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::Amount;
use crate::expense::ExpenseCategory;

/// Violation recorded when an amount is over the configured limit
pub const AMOUNT_LIMIT_VIOLATION: &str = "Amount exceeds the maximum limit";

/// Violation recorded when receipt analysis reports a duplicate
pub const DUPLICATE_RECEIPT_VIOLATION: &str = "Possible duplicate receipt detected";

/// Policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Amounts strictly greater than this are flagged
    pub max_amount: Decimal,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_amount: dec!(1000),
        }
    }
}

/// Signals produced outside the core, typically by receipt analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSignals {
    /// Receipt matched a previously submitted one
    #[serde(default)]
    pub duplicate_receipt: bool,
    /// Violations reported by the receipt analysis service
    #[serde(default)]
    pub ai_violations: Vec<String>,
}

impl ExternalSignals {
    /// No external signals
    pub fn none() -> Self {
        Self::default()
    }
}

/// Evaluates expense claims against the expense policy
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    config: PolicyConfig,
}

impl PolicyEvaluator {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Returns the configured amount limit
    pub fn max_amount(&self) -> Decimal {
        self.config.max_amount
    }

    /// Produces the ordered list of violations for a claim
    ///
    /// The built-in amount rule always comes first; external signals are
    /// appended after it and can only add violations, never remove one.
    pub fn evaluate(
        &self,
        amount: Amount,
        _category: ExpenseCategory,
        signals: &ExternalSignals,
    ) -> Vec<String> {
        let mut violations = Vec::new();

        if amount.value() > self.config.max_amount {
            violations.push(AMOUNT_LIMIT_VIOLATION.to_string());
        }

        if signals.duplicate_receipt {
            push_unique(&mut violations, DUPLICATE_RECEIPT_VIOLATION);
        }

        for violation in &signals.ai_violations {
            if !violation.trim().is_empty() {
                push_unique(&mut violations, violation);
            }
        }

        violations
    }
}

fn push_unique(violations: &mut Vec<String>, violation: &str) {
    if !violations.iter().any(|v| v == violation) {
        violations.push(violation.to_string());
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn builtin_rule_matches_threshold(minor in 1i64..500_000i64) {
            let evaluator = PolicyEvaluator::default();
            let value = Amount::from_minor(minor).unwrap();
            let violations = evaluator.evaluate(value, ExpenseCategory::Travel, &ExternalSignals::none());
            prop_assert_eq!(!violations.is_empty(), value.value() > dec!(1000));
        }

        #[test]
        fn signals_never_remove_builtin(minor in 1i64..500_000i64, duplicate in any::<bool>()) {
            let evaluator = PolicyEvaluator::default();
            let value = Amount::from_minor(minor).unwrap();
            let plain = evaluator.evaluate(value, ExpenseCategory::Travel, &ExternalSignals::none());
            let signals = ExternalSignals { duplicate_receipt: duplicate, ai_violations: vec!["x".to_string()] };
            let annotated = evaluator.evaluate(value, ExpenseCategory::Travel, &signals);
            prop_assert!(annotated.starts_with(&plain));
        }
    }
}
