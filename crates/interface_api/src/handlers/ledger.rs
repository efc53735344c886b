//! Ledger connection and export handlers

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use tracing::{info, instrument, warn};

use domain_expense::{Actor, Role};
use domain_export::{SyncTrigger, TriggerOutcome};

use crate::auth::require_role;
use crate::dto::ledger::*;
use crate::{error::ApiError, AppState};

/// Runs a reconciliation pass now
///
/// Answers 409 when a pass is already running. When nothing could be
/// exported because the ledger needs re-authorization the answer is 401
/// `reauthorization_required`; otherwise the report is returned even if
/// some batches failed.
#[instrument(skip(state), fields(requested_by = %actor.id))]
pub async fn export(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ExportResponse>, ApiError> {
    require_role(&actor, &[Role::Finance])?;

    match state.scheduler.trigger(SyncTrigger::Manual).await {
        TriggerOutcome::Completed(report) => {
            if report.exported_count() == 0 && report.requires_reauthorization() {
                return Err(ApiError::ReauthorizationRequired(
                    "The ledger connection must be re-authorized before exporting".to_string(),
                ));
            }
            Ok(Json(report.into()))
        }
        TriggerOutcome::Skipped => Err(ApiError::Conflict(
            "A ledger export is already running".to_string(),
        )),
        TriggerOutcome::Failed(e) => Err(e.into()),
    }
}

/// Returns the consent URL a finance user follows to connect the ledger
pub async fn auth_url(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    require_role(&actor, &[Role::Finance])?;

    let configured = state
        .config
        .ledger_config()
        .map(|c| c.is_configured())
        .unwrap_or(false);
    if !configured {
        return Err(ApiError::ServiceUnavailable(
            "Ledger client credentials are not configured".to_string(),
        ));
    }

    let url = state.ledger.tokens().authorization_url().await?;
    Ok(Json(AuthUrlResponse { url }))
}

/// Reports the ledger connection and the sync loop state
pub async fn status(State(state): State<AppState>) -> Json<LedgerStatusResponse> {
    Json(LedgerStatusResponse {
        ledger: state.ledger.connection_status().await,
        sync: SyncStatus {
            state: state.scheduler.state(),
            interval_secs: state.scheduler.interval().as_secs(),
        },
    })
}

/// OAuth redirect target
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, ApiError> {
    if let Some(error) = params.error {
        warn!(%error, "Ledger authorization declined");
        let detail = params
            .error_description
            .map(|d| format!("{error}: {d}"))
            .unwrap_or(error);
        return Err(ApiError::BadRequest(format!("Authorization declined ({detail})")));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(ApiError::BadRequest(
            "Callback requires code and state".to_string(),
        ));
    };

    let tokens = state.ledger.tokens();
    tokens
        .complete_authorization(&code, &oauth_state, params.realm_id.as_deref())
        .await?;

    info!(realm_id = ?params.realm_id, "Ledger authorization completed");
    Ok(Json(CallbackResponse {
        connected: true,
        realm_id: tokens.realm_id().await,
    }))
}
