use crate::{entities::Processor, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use utoipa::ToSchema;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub uptime_secs: u64,
    pub database: ComponentHealth,
    /// Processors whose webhook secret is configured
    pub webhook_processors: Vec<Processor>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub up: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe
#[utoipa::path(get, path = "/api/v1/health", responses((status = 200, description = "Service is running")), tag = "Health")]
pub async fn liveness() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness probe; 503 when the database is unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Ready", body = StatusResponse),
        (status = 503, description = "Database unavailable", body = StatusResponse)
    ),
    tag = "Health"
)]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let database = ComponentHealth {
        up: db_result.is_ok(),
        latency_ms: started.elapsed().as_millis() as u64,
        error: db_result.err().map(|e| e.to_string()),
    };

    let code = if database.up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = StatusResponse {
        status: if database.up { "ready" } else { "not_ready" },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        uptime_secs: get_uptime_secs(),
        database,
        webhook_processors: state.reconciler.configured_processors(),
    };
    (code, Json(body))
}
