//! HTTP API Layer
//!
//! This crate provides the REST API for the expense workflow using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: submission, approval, ledger export and connection
//! - **Middleware**: Authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_expense::{ApprovalAuthority, ExpenseService, ExpenseStore, UserDirectory};
use domain_export::SyncScheduler;
use infra_ledger::QuickBooksLedgerClient;

use crate::config::ApiConfig;
use crate::handlers::{approvals, expenses, health, ledger};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn ExpenseStore>,
    pub users: Arc<dyn UserDirectory>,
    pub expenses: Arc<ExpenseService>,
    pub approvals: Arc<ApprovalAuthority>,
    pub scheduler: Arc<SyncScheduler>,
    pub ledger: Arc<QuickBooksLedgerClient>,
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/ledger/callback", get(ledger::callback));

    let expense_routes = Router::new()
        .route("/", post(expenses::submit_expense).get(expenses::list_my_expenses))
        .route(
            "/:id",
            get(expenses::get_expense)
                .patch(expenses::revise_expense)
                .delete(expenses::delete_expense),
        );

    let approval_routes = Router::new()
        .route("/pending", get(approvals::list_pending))
        .route("/:id/approve", post(approvals::approve))
        .route("/:id/reject", post(approvals::reject));

    let ledger_routes = Router::new()
        .route("/export", post(ledger::export))
        .route("/auth-url", get(ledger::auth_url))
        .route("/status", get(ledger::status));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/expenses", expense_routes)
        .nest("/approvals", approval_routes)
        .nest("/ledger", ledger_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
