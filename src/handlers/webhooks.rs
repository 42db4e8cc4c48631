use crate::{errors::ServiceError, webhooks::WebhookAck, AppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use bytes::Bytes;

use super::parse_processor;

/// Receives a processor webhook. The raw body is needed for signature
/// verification, so it is taken as bytes rather than JSON.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/{processor}",
    params(("processor" = String, Path, description = "stripe, paypal or card_gateway")),
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged (applied, duplicate, out of order or ignored)", body = WebhookAck),
        (status = 400, description = "Verified payload could not be interpreted", body = crate::errors::ErrorResponse),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown processor or transaction", body = crate::errors::ErrorResponse),
        (status = 500, description = "Processor not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(processor): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let processor = parse_processor(&processor)?;
    let ack = state.reconciler.handle(processor, &headers, &body).await?;
    Ok(Json(ack))
}
