use crate::{
    auth::Actor,
    errors::ServiceError,
    services::exports::{ExportKind, ExportRequest},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use std::str::FromStr;

pub const PRIVACY_HEADER: &str = "x-export-privacy";

#[utoipa::path(
    get,
    path = "/api/v1/exports/{kind}",
    params(
        ("kind" = String, Path, description = "donations, registrations, volunteers or campaign_summary"),
        ExportRequest
    ),
    responses(
        (status = 200, description = "CSV document", content_type = "text/csv"),
        (status = 400, description = "Missing fundraiser or bad range", body = crate::errors::ErrorResponse),
        (status = 503, description = "Storage unavailable, retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Exports"
)]
pub async fn export(
    State(state): State<AppState>,
    actor: Actor,
    Path(kind): Path<String>,
    Query(request): Query<ExportRequest>,
) -> Result<Response, ServiceError> {
    let kind = ExportKind::from_str(&kind)
        .map_err(|_| ServiceError::NotFound(format!("Unknown export kind '{}'", kind)))?;
    let output = state.exports.export(&actor, kind, &request).await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}.csv\"", kind))
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;
    let privacy = HeaderValue::from_str(&output.privacy.to_string())
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (HeaderName::from_static(PRIVACY_HEADER), privacy),
        ],
        output.content,
    )
        .into_response())
}
