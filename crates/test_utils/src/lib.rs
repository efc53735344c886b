//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! expense workflow test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built users, dates and amounts
//! - `builders`: Builder patterns for expenses and users in any lifecycle state
//! - `database`: PostgreSQL testcontainer management
//! - `assertions`: Assertion helpers for expense records
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
