//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the expense workflow using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: repositories own the SQL and
//! speak in row types, adapters implement the domain ports
//! (`ExpenseStore`, `UserDirectory`) on top of them.
//!
//! Every write after submission is conditional on the stored status, so
//! the database itself arbitrates races between reviewers and between
//! overlapping reconciliation passes.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgExpenseStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/expenses")).await?;
//! run_migrations(&pool).await?;
//! let store = PgExpenseStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{PgExpenseStore, PgUserDirectory};
