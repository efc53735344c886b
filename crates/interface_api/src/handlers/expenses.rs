//! Expense submission handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Amount, ExpenseId};
use domain_expense::ports::SortOrder;
use domain_expense::{Actor, ExpenseQuery, ExpenseRevision, NewExpense};

use crate::dto::expenses::*;
use crate::{error::ApiError, AppState};

/// Submits a claim on behalf of the caller
#[instrument(skip(state, request), fields(claimant = %actor.id))]
pub async fn submit_expense(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<SubmitExpenseRequest>,
) -> Result<(StatusCode, Json<ExpenseResponse>), ApiError> {
    request.validate()?;

    let expense = state
        .expenses
        .submit(NewExpense {
            claimant_id: actor.id,
            description: request.description,
            amount: Amount::new(request.amount)?,
            category: request.category,
            expense_date: request.expense_date,
            notes: request.notes,
            receipt: request.receipt.map(Into::into),
            signals: request.signals,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(expense.into())))
}

/// Lists the caller's own expenses, newest first
pub async fn list_my_expenses(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ExpenseResponse>>, ApiError> {
    let query = ExpenseQuery {
        order: SortOrder::NewestFirst,
        ..ExpenseQuery::default()
    }
    .for_claimants(vec![actor.id]);

    let expenses = state
        .store
        .find(query)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(expenses.into_iter().map(ExpenseResponse::from).collect()))
}

/// Gets an expense; visible to its claimant and to reviewers
pub async fn get_expense(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    let expense = state.expenses.get(ExpenseId::from_uuid(id)).await?;
    if expense.claimant_id != actor.id && !actor.role.can_review() {
        return Err(ApiError::Forbidden(
            "You can only view your own expenses".to_string(),
        ));
    }
    Ok(Json(expense.into()))
}

/// Revises a pending expense
#[instrument(skip(state, request), fields(claimant = %actor.id, expense_id = %id))]
pub async fn revise_expense(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviseExpenseRequest>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    request.validate()?;

    let revision = ExpenseRevision {
        description: request.description,
        amount: request.amount.map(Amount::new).transpose()?,
        category: request.category,
        expense_date: request.expense_date,
        receipt: request.receipt.map(Into::into),
        signals: request.signals,
    };

    let expense = state
        .expenses
        .revise(actor.id, ExpenseId::from_uuid(id), revision)
        .await?;

    Ok(Json(expense.into()))
}

/// Deletes a pending expense
#[instrument(skip(state), fields(claimant = %actor.id, expense_id = %id))]
pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state
        .expenses
        .delete(actor.id, ExpenseId::from_uuid(id))
        .await?;
    Ok(Json(DeletedResponse { id, deleted: true }))
}
