//! Fundraiser Ledger
//!
//! Payment ledger for campaign donations and event tickets: fee calculation,
//! webhook-driven transaction state, settlement reconciliation, payouts and
//! privacy-aware exports.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod money;
pub mod openapi;
pub mod rate_limiter;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    events::EventSender,
    rate_limiter::{KeyedRateLimit, RateLimitBackend, RateLimitConfig, RateLimiter},
    services::{
        exports::ExportService, fees::FeeConfig, keyed_lock::KeyedLocks, ledger::LedgerService,
        payouts::PayoutService, settlement::SettlementService,
    },
    webhooks::{WebhookAdapters, WebhookReconciler},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: EventSender,
    pub ledger: LedgerService,
    pub reconciler: WebhookReconciler,
    pub settlement: SettlementService,
    pub payouts: PayoutService,
    pub exports: ExportService,
}

impl AppState {
    /// Wires every service from configuration. All writers share one set of
    /// keyed locks so a ledger row is never written by two paths at once.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: EventSender,
        rate_limiter: Arc<dyn KeyedRateLimit>,
    ) -> Self {
        let fees: Arc<FeeConfig> = Arc::new(config.fees.clone());
        let locks = KeyedLocks::new();

        let ledger = LedgerService::new(
            db.clone(),
            fees.clone(),
            config.default_currency.clone(),
            locks.clone(),
            event_sender.clone(),
        );
        let reconciler = WebhookReconciler::new(
            db.clone(),
            WebhookAdapters::from_config(&config),
            fees,
            locks.clone(),
            event_sender.clone(),
        );
        let settlement = SettlementService::new(db.clone(), locks.clone());
        let payouts = PayoutService::new(
            db.clone(),
            locks,
            rate_limiter,
            event_sender.clone(),
            config.default_currency.clone(),
        );
        let exports = ExportService::new(db.clone());

        Self {
            db,
            config: Arc::new(config),
            event_sender,
            ledger,
            reconciler,
            settlement,
            payouts,
            exports,
        }
    }
}

/// Builds the cash-out rate limiter described by the configuration.
pub fn cashout_rate_limiter(
    cfg: &config::AppConfig,
) -> Result<Arc<dyn KeyedRateLimit>, ServiceError> {
    let rl_cfg = RateLimitConfig {
        requests_per_window: cfg.cashout_rate_limit_requests,
        window_duration: Duration::from_secs(cfg.cashout_rate_limit_window_secs),
    };
    let backend = if cfg.rate_limit_use_redis {
        let client = redis::Client::open(cfg.redis_url())
            .map_err(|e| ServiceError::Configuration(format!("invalid redis_url: {}", e)))?;
        RateLimitBackend::Redis {
            client: Arc::new(client),
            namespace: cfg.rate_limit_namespace.clone(),
        }
    } else {
        RateLimitBackend::InMemory
    };
    let limiter = RateLimiter::new(rl_cfg, backend)
        .map_err(|e| ServiceError::Configuration(e.to_string()))?;
    Ok(Arc::new(limiter))
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let webhooks = Router::new().route(
        "/webhooks/:processor",
        post(handlers::webhooks::receive_webhook),
    );

    let transactions = Router::new()
        .route(
            "/transactions",
            post(handlers::transactions::record_checkout),
        )
        .route(
            "/transactions/expire-stale",
            post(handlers::transactions::expire_stale),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        );

    let settlements = Router::new().route(
        "/settlements/:processor",
        post(handlers::settlements::reconcile_settlements),
    );

    let payouts = Router::new()
        .route(
            "/fundraisers/:id/payout-summary",
            get(handlers::payouts::payout_summary),
        )
        .route(
            "/fundraisers/:id/payouts",
            post(handlers::payouts::create_payout),
        )
        .route("/payouts/cashout", post(handlers::payouts::request_cashout))
        .route("/payouts/:id", get(handlers::payouts::get_payout))
        .route(
            "/payouts/:id/status",
            put(handlers::payouts::update_payout_status),
        )
        .route(
            "/payouts/:id/cashout-requests",
            get(handlers::payouts::list_cashout_requests),
        );

    let exports = Router::new().route("/exports/:kind", get(handlers::exports::export));

    let health = Router::new()
        .route("/health", get(handlers::health::liveness))
        .route("/status", get(handlers::health::status));

    Router::new()
        .merge(webhooks)
        .merge(transactions)
        .merge(settlements)
        .merge(payouts)
        .merge(exports)
        .merge(health)
}

/// The complete HTTP application: versioned API, OpenAPI document,
/// request-id propagation and HTTP tracing.
pub fn app_router(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/", get(|| async { "fundraiser-ledger up" }))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
