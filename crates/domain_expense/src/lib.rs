//! Expense Management Domain
//!
//! This crate implements the expense claim lifecycle from submission through
//! review, together with the policy rules that annotate claims and the
//! authority that decides who may act on them.
//!
//! # Expense Lifecycle
//!
//! ```text
//! Submitted -> Pending -> Approved -> (exported to ledger)
//!                     \-> Rejected
//! ```
//!
//! Approved and Rejected are terminal. Once terminal, an expense can no
//! longer be edited, deleted or transitioned again.

pub mod expense;
pub mod policy;
pub mod user;
pub mod ports;
pub mod approval;
pub mod service;
pub mod error;

pub use expense::{
    Expense, ExpenseStatus, ExpenseCategory, ReceiptRef, NewExpense, ExpenseRevision,
};
pub use policy::{PolicyEvaluator, PolicyConfig, ExternalSignals, AMOUNT_LIMIT_VIOLATION};
pub use user::{User, Role, Actor};
pub use ports::{ExpenseStore, ExpenseQuery, UserDirectory};
pub use approval::{ApprovalAuthority, ApprovalConfig, EmptyTeamPolicy};
pub use service::ExpenseService;
pub use error::ExpenseError;
