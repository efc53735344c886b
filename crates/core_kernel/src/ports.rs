//! Shared port vocabulary
//!
//! Every adapter the domains talk to (the expense store, the identity
//! directory, the ledger, the token store) reports failures as a
//! [`PortError`] and can be probed through [`HealthCheckable`].
//!
//! ```text
//!   ApprovalAuthority / ExportReconciler / SyncScheduler
//!                         │
//!            ExpenseStore · UserDirectory · LedgerPort
//!                 ▲                          ▲
//!            PostgreSQL                 ledger REST API
//!           (in-memory mocks behind the `mock` features)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure reported by a port implementation
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Rejected by store: {0}")]
    Validation(String),

    /// A conditional write found the record in an unexpected state
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// The backing system could not be reached; retrying may succeed
    #[error("Backend unavailable: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Adapter failure: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl PortError {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause to a connection or internal error
    pub fn with_source(self, cause: impl StdError + Send + Sync + 'static) -> Self {
        match self {
            PortError::Connection { message, .. } => PortError::Connection {
                message,
                source: Some(Box::new(cause)),
            },
            PortError::Internal { message, .. } => PortError::Internal {
                message,
                source: Some(Box::new(cause)),
            },
            other => other,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict(_))
    }
}

/// Marker for port traits; implementations are shared as `Arc<dyn _>`
/// across tasks
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// Outcome of probing one adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(adapter_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Unhealthy,
            latency_ms: 0,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
