//! Approval handlers

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{ExpenseId, UserId};
use domain_expense::{Actor, Expense, User};

use crate::dto::expenses::*;
use crate::{error::ApiError, AppState};

/// Lists the pending expenses the caller may review
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ExpenseResponse>>, ApiError> {
    let expenses = state.approvals.list_pending(&actor).await?;
    let claimants = load_claimants(&state, &expenses).await;

    let body = expenses
        .into_iter()
        .map(|e| {
            let claimant = claimants.get(&e.claimant_id);
            ExpenseResponse::from(e)
                .with_claimant(claimant)
                .without_receipt_details()
        })
        .collect();

    Ok(Json(body))
}

/// Approves a pending expense
#[instrument(skip(state, body), fields(approver = %actor.id, expense_id = %id))]
pub async fn approve(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    let notes = body.and_then(|Json(b)| b.notes);
    let expense = state
        .approvals
        .approve(&actor, ExpenseId::from_uuid(id), notes.as_deref())
        .await?;
    Ok(Json(with_claimant(&state, expense).await))
}

/// Rejects a pending expense; a reason is required
#[instrument(skip(state, request), fields(approver = %actor.id, expense_id = %id))]
pub async fn reject(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    request.validate()?;
    let expense = state
        .approvals
        .reject(&actor, ExpenseId::from_uuid(id), &request.notes)
        .await?;
    Ok(Json(with_claimant(&state, expense).await))
}

async fn with_claimant(state: &AppState, expense: Expense) -> ExpenseResponse {
    let claimants = load_claimants(state, std::slice::from_ref(&expense)).await;
    let claimant = claimants.get(&expense.claimant_id);
    ExpenseResponse::from(expense).with_claimant(claimant)
}

/// Resolves claimant records for display; lookup failures only cost the
/// summary, never the response
async fn load_claimants(state: &AppState, expenses: &[Expense]) -> HashMap<UserId, User> {
    let mut claimants = HashMap::new();
    for expense in expenses {
        if claimants.contains_key(&expense.claimant_id) {
            continue;
        }
        match state.users.get_user(expense.claimant_id).await {
            Ok(Some(user)) => {
                claimants.insert(expense.claimant_id, user);
            }
            Ok(None) => {}
            Err(e) => warn!(claimant = %expense.claimant_id, error = %e, "Claimant lookup failed"),
        }
    }
    claimants
}
