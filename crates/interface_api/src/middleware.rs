//! API middleware

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{info, warn};

use domain_expense::Actor;

use crate::error::ApiError;
use crate::AppState;

/// Authentication middleware
///
/// Validates the bearer JWT and stores the caller's `Claims` and `Actor`
/// in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        warn!("Missing or invalid Authorization header");
        return ApiError::Unauthorized.into_response();
    };

    let authenticated = crate::auth::validate_token(token, &state.config.jwt_secret)
        .and_then(|claims| claims.actor().map(|actor| (claims, actor)));

    match authenticated {
        Ok((claims, actor)) => {
            request.extensions_mut().insert(claims);
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, "Token validation failed");
            ApiError::from(e).into_response()
        }
    }
}

/// Audit logging middleware
///
/// Logs every API request with the acting user and outcome
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let actor = request.extensions().get::<Actor>().copied();

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        user = %actor.map(|a| a.id.to_string()).unwrap_or_else(|| "anonymous".to_string()),
        role = actor.map(|a| a.role.as_str()).unwrap_or("none"),
        status = status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "API request"
    );

    response
}
