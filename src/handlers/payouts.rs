use crate::{
    auth::Actor,
    entities::{cashout_request, payout},
    errors::ServiceError,
    services::{
        ledger::TransactionFilter,
        payouts::{CashoutInput, CashoutReceipt, CreatePayout, PayoutSummary, UpdatePayoutStatus},
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/fundraisers/{id}/payout-summary",
    params(
        ("id" = Uuid, Path, description = "Fundraiser id"),
        ("from" = Option<String>, Query, description = "Inclusive RFC 3339 lower bound"),
        ("to" = Option<String>, Query, description = "Exclusive RFC 3339 upper bound"),
        ("settlement_status" = Option<String>, Query, description = "pending, settled or failed"),
        ("currency" = Option<String>, Query, description = "ISO 4217 code")
    ),
    responses(
        (status = 200, description = "Totals and transactions", body = PayoutSummary),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Fundraiser not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payouts"
)]
pub async fn payout_summary(
    State(state): State<AppState>,
    actor: Actor,
    Path(fundraiser_id): Path<Uuid>,
    Query(filter): Query<TransactionFilter>,
) -> ApiResult<PayoutSummary> {
    let summary = state
        .payouts
        .payout_summary(&actor, fundraiser_id, &filter)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Opens a payout, or returns the one already in progress.
#[utoipa::path(
    post,
    path = "/api/v1/fundraisers/{id}/payouts",
    params(("id" = Uuid, Path, description = "Fundraiser id")),
    request_body = CreatePayout,
    responses(
        (status = 201, description = "Payout opened"),
        (status = 200, description = "Existing live payout returned"),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse)
    ),
    tag = "Payouts"
)]
pub async fn create_payout(
    State(state): State<AppState>,
    actor: Actor,
    Path(fundraiser_id): Path<Uuid>,
    payload: Option<Json<CreatePayout>>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = payload.map(|Json(p)| p).unwrap_or_default();
    let (payout, created) = state
        .payouts
        .create_payout(&actor, fundraiser_id, input)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(payout))))
}

#[utoipa::path(
    get,
    path = "/api/v1/payouts/{id}",
    params(("id" = Uuid, Path, description = "Payout id")),
    responses(
        (status = 200, description = "Payout with freshly aggregated totals"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payouts"
)]
pub async fn get_payout(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<payout::Model> {
    let payout = state.payouts.get_payout(&actor, id).await?;
    Ok(Json(ApiResponse::success(payout)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payouts/cashout",
    request_body = CashoutInput,
    responses(
        (status = 200, description = "Cash-out requested", body = CashoutReceipt),
        (status = 403, description = "Only the owner may cash out", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payout already closed", body = crate::errors::ErrorResponse),
        (status = 429, description = "Too many cash-out requests", body = crate::errors::ErrorResponse)
    ),
    tag = "Payouts"
)]
pub async fn request_cashout(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CashoutInput>,
) -> ApiResult<CashoutReceipt> {
    let receipt = state.payouts.request_cashout(&actor, payload).await?;
    let mut response = ApiResponse::success(receipt);
    response.message = Some("Cash-out request received".to_string());
    Ok(Json(response))
}

#[utoipa::path(
    put,
    path = "/api/v1/payouts/{id}/status",
    params(("id" = Uuid, Path, description = "Payout id")),
    request_body = UpdatePayoutStatus,
    responses(
        (status = 200, description = "Payout updated"),
        (status = 403, description = "Operator role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Illegal transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Payouts"
)]
pub async fn update_payout_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePayoutStatus>,
) -> ApiResult<payout::Model> {
    let payout = state.payouts.update_status(&actor, id, payload).await?;
    Ok(Json(ApiResponse::success(payout)))
}

#[utoipa::path(
    get,
    path = "/api/v1/payouts/{id}/cashout-requests",
    params(("id" = Uuid, Path, description = "Payout id")),
    responses(
        (status = 200, description = "Cash-out audit trail, oldest first"),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse)
    ),
    tag = "Payouts"
)]
pub async fn list_cashout_requests(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<cashout_request::Model>> {
    let requests = state.payouts.list_cashout_requests(&actor, id).await?;
    Ok(Json(ApiResponse::success(requests)))
}
