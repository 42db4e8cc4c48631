use crate::{
    auth::Actor,
    services::settlement::{SettlementReport, SettlementStatement},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};

use super::parse_processor;

/// Applies a processor settlement statement. Operator only.
#[utoipa::path(
    post,
    path = "/api/v1/settlements/{processor}",
    params(("processor" = String, Path, description = "stripe, paypal or card_gateway")),
    request_body = SettlementStatement,
    responses(
        (status = 200, description = "Statement reconciled", body = SettlementReport),
        (status = 403, description = "Operator role required", body = crate::errors::ErrorResponse)
    ),
    tag = "Settlements"
)]
pub async fn reconcile_settlements(
    State(state): State<AppState>,
    actor: Actor,
    Path(processor): Path<String>,
    Json(statement): Json<SettlementStatement>,
) -> ApiResult<SettlementReport> {
    actor.require_operator()?;
    let processor = parse_processor(&processor)?;
    let report = state
        .settlement
        .reconcile_settlements(processor, statement)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
