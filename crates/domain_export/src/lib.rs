//! Export Domain - Ledger Reconciliation
//!
//! This crate moves approved expense claims into the external ledger exactly
//! once, no matter how often a reconciliation pass is retried or how the
//! scheduled and manual triggers interleave.
//!
//! # Reconciliation Pass
//!
//! ```text
//! Approved & unexported
//!     -> group per claimant
//!     -> stage batch (deterministic idempotency key)
//!     -> ledger write (lookup-before-create, bounded by timeout)
//!     -> mark exported (one atomic store update per batch)
//! ```
//!
//! A batch that was written but not marked (crash, store outage) keeps its
//! key, so the next pass finds the existing remote record instead of
//! creating a second one.

pub mod account;
pub mod batch;
pub mod ports;
pub mod report;
pub mod reconciler;
pub mod scheduler;
pub mod error;

pub use account::expense_account;
pub use batch::batch_key;
pub use ports::{LedgerPort, ReimbursementLine, ReimbursementReceipt, ReimbursementRequest};
pub use report::{ExportFailure, ExportSuccess, ReconciliationReport, SyncTrigger};
pub use reconciler::{ExportReconciler, ReconcilerConfig};
pub use scheduler::{SchedulerState, SyncScheduler, TriggerOutcome, DEFAULT_SYNC_INTERVAL};
pub use error::{ExportError, LedgerError};
