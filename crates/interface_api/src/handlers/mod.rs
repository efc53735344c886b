//! Request handlers

pub mod approvals;
pub mod expenses;
pub mod health;
pub mod ledger;
