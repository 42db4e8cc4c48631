use crate::{
    auth::Actor,
    entities::transaction,
    errors::ServiceError,
    services::ledger::{NewTransaction, SweepReport},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = NewTransaction,
    responses(
        (status = 201, description = "Pending transaction recorded"),
        (status = 200, description = "Checkout already recorded for this processor reference"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Fundraiser not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn record_checkout(
    State(state): State<AppState>,
    Json(payload): Json<NewTransaction>,
) -> Result<impl IntoResponse, ServiceError> {
    let (txn, created) = state.ledger.record_checkout(payload).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(txn))))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction"),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<transaction::Model> {
    let txn = state.ledger.get_transaction(&actor, id).await?;
    Ok(Json(ApiResponse::success(txn)))
}

/// Runs the stale-pending sweep immediately.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/expire-stale",
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 403, description = "Operator role required", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn expire_stale(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<SweepReport> {
    actor.require_operator()?;
    let report = state
        .ledger
        .expire_stale_pending(state.config.pending_max_age())
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
