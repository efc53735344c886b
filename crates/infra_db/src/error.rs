//! Database error types
//!
//! Errors raised by the repositories, with the PostgreSQL error codes mapped
//! onto meaningful variants and a translation into the domain `PortError`.

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional write found the row in an unexpected state
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped onto the domain model
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Expense", "EXP-123");
    /// assert!(error.to_string().contains("Expense"));
    /// ```
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

/// Maps SQLx errors onto specific variants by PostgreSQL error code
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound {
                entity: "Record",
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::PoolClosed => DatabaseError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Database(db_err) => {
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::Conflict(msg) | DatabaseError::DuplicateEntry(msg) => {
                PortError::conflict(msg)
            }
            DatabaseError::ForeignKeyViolation(msg) | DatabaseError::ConstraintViolation(msg) => {
                PortError::validation(msg)
            }
            DatabaseError::ConnectionFailed(msg) => PortError::connection(msg),
            DatabaseError::PoolExhausted => PortError::connection("connection pool exhausted"),
            other => {
                let message = other.to_string();
                PortError::internal(message).with_source(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_port_not_found() {
        let port: PortError = DatabaseError::not_found("Expense", "abc").into();
        assert!(port.is_not_found());
    }

    #[test]
    fn test_conflicts_map_to_port_conflict() {
        let port: PortError = DatabaseError::Conflict("status changed".into()).into();
        assert!(port.is_conflict());

        let port: PortError = DatabaseError::DuplicateEntry("email".into()).into();
        assert!(port.is_conflict());
    }

    #[test]
    fn test_pool_errors_are_transient() {
        let port: PortError = DatabaseError::PoolExhausted.into();
        assert!(port.is_transient());
        assert!(DatabaseError::PoolExhausted.is_connection_error());
    }

    #[test]
    fn test_row_not_found() {
        let error = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(error.is_not_found());
    }
}
