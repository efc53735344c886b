//! Pre-built Test Fixtures
//!
//! Ready-to-use users, dates and amounts. Fixtures are deterministic so
//! assertions can name exact values.

use chrono::NaiveDate;
use core_kernel::Amount;
use domain_expense::{Role, User};
use rust_decimal_macros::dec;

/// Fixture for amounts around the default policy limit of 1000
pub struct AmountFixtures;

impl AmountFixtures {
    /// A typical claim well under the limit
    pub fn lunch() -> Amount {
        Amount::new(dec!(42.50)).expect("valid amount")
    }

    pub fn hotel() -> Amount {
        Amount::new(dec!(500.00)).expect("valid amount")
    }

    /// Exactly the limit, which is not a violation
    pub fn at_limit() -> Amount {
        Amount::new(dec!(1000.00)).expect("valid amount")
    }

    /// Just over the limit
    pub fn over_limit() -> Amount {
        Amount::new(dec!(1200.00)).expect("valid amount")
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// Default incurred date for expenses
    pub fn expense_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
    }
}

/// A manager with two direct reports, plus a finance reviewer and an
/// employee with no declared manager
#[derive(Debug, Clone)]
pub struct Team {
    pub manager: User,
    pub alice: User,
    pub bob: User,
    pub finance: User,
    pub loner: User,
}

impl Team {
    pub fn new() -> Self {
        let manager = User::new("Mara Manager", "mara@example.com", Role::Manager);
        let alice = User::new("Alice Adams", "alice@example.com", Role::Employee).reporting_to(manager.id);
        let bob = User::new("Bob Brown", "bob@example.com", Role::Employee).reporting_to(manager.id);
        let finance = User::new("Fin Ance", "finance@example.com", Role::Finance);
        let loner = User::new("Lou Loner", "lou@example.com", Role::Employee);

        Self {
            manager,
            alice,
            bob,
            finance,
            loner,
        }
    }

    /// Every user, managers first so foreign keys resolve on insert
    pub fn all(&self) -> Vec<User> {
        vec![
            self.manager.clone(),
            self.finance.clone(),
            self.alice.clone(),
            self.bob.clone(),
            self.loner.clone(),
        ]
    }
}

impl Default for Team {
    fn default() -> Self {
        Self::new()
    }
}
