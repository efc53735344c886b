//! Domain Adapters
//!
//! PostgreSQL implementations of the expense domain ports. Each adapter
//! implements the port trait, translates between domain models and row
//! types, and delegates SQL to the repository layer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_expense::ExpenseStore;
//! use infra_db::adapters::PgExpenseStore;
//!
//! let store: Arc<dyn ExpenseStore> = Arc::new(PgExpenseStore::new(pool));
//! let expense = store.get(expense_id).await?;
//! ```

pub mod expenses;
pub mod users;

pub use expenses::PgExpenseStore;
pub use users::PgUserDirectory;

use std::time::Instant;

use core_kernel::HealthCheckResult;
use sqlx::PgPool;

/// Runs `SELECT 1` against the pool and reports the outcome
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => HealthCheckResult::healthy(adapter_id, latency_ms),
        Err(e) => HealthCheckResult::unhealthy(adapter_id, format!("Database error: {e}")),
    }
}
