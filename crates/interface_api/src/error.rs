//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::AmountError;
use domain_expense::ExpenseError;
use domain_export::{ExportError, LedgerError};

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The ledger connection must be re-authorized by a finance user
    #[error("Ledger reauthorization required: {0}")]
    ReauthorizationRequired(String),

    /// The ledger answered with an error or could not be reached
    #[error("Ledger error: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::ReauthorizationRequired(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::Validation(_) => "validation_error",
            ApiError::ReauthorizationRequired(_) => "reauthorization_required",
            ApiError::BadGateway(_) => "ledger_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error while handling request");
                "An internal error occurred".to_string()
            }
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg)
            | ApiError::Validation(msg)
            | ApiError::ReauthorizationRequired(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg) => msg.clone(),
        };

        let body = ErrorResponse {
            error: self.error_type().to_string(),
            message,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<ExpenseError> for ApiError {
    fn from(err: ExpenseError) -> Self {
        match err {
            ExpenseError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ExpenseError::InvalidState { .. }
            | ExpenseError::AlreadyExported(_)
            | ExpenseError::ConcurrencyConflict(_) => ApiError::Conflict(err.to_string()),
            ExpenseError::Forbidden(msg) => ApiError::Forbidden(msg),
            ExpenseError::Validation(msg) => ApiError::Validation(msg),
            ExpenseError::Amount(e) => ApiError::Validation(e.to_string()),
            ExpenseError::Store(e) if e.is_transient() => ApiError::ServiceUnavailable(e.to_string()),
            ExpenseError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if err.requires_reauthorization() {
            return ApiError::ReauthorizationRequired(err.to_string());
        }
        match err {
            LedgerError::InvalidState => ApiError::BadRequest(err.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Cancelled => ApiError::ServiceUnavailable(err.to_string()),
            ExportError::Store(e) if e.is_transient() => ApiError::ServiceUnavailable(e.to_string()),
            ExportError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AmountError> for ApiError {
    fn from(err: AmountError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingRole(msg) => ApiError::Forbidden(msg),
            _ => ApiError::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{ExpenseId, PortError};
    use domain_expense::ExpenseStatus;

    #[test]
    fn test_expense_error_status_codes() {
        let id = ExpenseId::new_v7();
        let cases = [
            (ExpenseError::NotFound(id), StatusCode::NOT_FOUND),
            (
                ExpenseError::InvalidState {
                    action: "approve",
                    status: ExpenseStatus::Rejected,
                },
                StatusCode::CONFLICT,
            ),
            (ExpenseError::ConcurrencyConflict(id), StatusCode::CONFLICT),
            (ExpenseError::Forbidden("team".into()), StatusCode::FORBIDDEN),
            (ExpenseError::Validation("notes".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ExpenseError::Store(PortError::internal("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_ledger_error_status_codes() {
        assert_eq!(
            ApiError::from(LedgerError::NotConnected).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(LedgerError::ReauthorizationRequired("revoked".into())).error_type(),
            "reauthorization_required"
        );
        assert_eq!(
            ApiError::from(LedgerError::InvalidState).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LedgerError::ServiceUnavailable(503)).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
