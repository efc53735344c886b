//! Repository implementations for data access
//!
//! Each repository owns the SQL for one table and speaks in row types;
//! translation to the domain model happens in the adapters.

pub mod expenses;
pub mod users;

pub use expenses::{DbExpenseStatus, ExpenseFilter, ExpenseRepository, ExpenseRow};
pub use users::{DbRole, UserRepository, UserRow};
