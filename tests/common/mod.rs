#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use fundraiser_ledger::{
    app_router,
    auth::Actor,
    config::AppConfig,
    db,
    entities::{fundraiser, transaction, volunteer_signup, FundraiserKind, Processor, SubjectKind},
    events::{self, Event, EventSender},
    services::ledger::NewTransaction,
    webhooks::{card_gateway, paypal, stripe, CardGatewayAdapter, PaypalAdapter, StripeAdapter},
    AppState,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const STRIPE_SECRET: &str = "whsec_test_secret";
pub const PAYPAL_SECRET: &str = "paypal_test_secret";
pub const PAYPAL_WEBHOOK_ID: &str = "WH-TEST-1";
pub const GATEWAY_SECRET: &str = "gateway_test_secret";

/// Application state backed by a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    _event_task: tokio::task::JoinHandle<()>,
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "redis://127.0.0.1:6379".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    // One connection: every connection to :memory: is a separate database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.stripe_webhook_secret = Some(STRIPE_SECRET.to_string());
    cfg.paypal_webhook_secret = Some(PAYPAL_SECRET.to_string());
    cfg.paypal_webhook_id = Some(PAYPAL_WEBHOOK_ID.to_string());
    cfg.card_gateway_webhook_secret = Some(GATEWAY_SECRET.to_string());
    cfg
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        Self::build(cfg, event_sender, event_task).await
    }

    /// Hands published domain events to the caller instead of the dispatcher.
    pub async fn capturing_events() -> (Self, mpsc::Receiver<Event>) {
        let (event_sender, event_rx) = EventSender::channel(256);
        let app = Self::build(test_config(), event_sender, tokio::spawn(async {})).await;
        (app, event_rx)
    }

    async fn build(
        cfg: AppConfig,
        event_sender: EventSender,
        event_task: tokio::task::JoinHandle<()>,
    ) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let limiter = fundraiser_ledger::cashout_rate_limiter(&cfg).expect("rate limiter");
        let state = AppState::new(db_arc.clone(), cfg, event_sender, limiter);
        let router = app_router(state.clone());

        Self {
            router,
            state,
            db: db_arc,
            _event_task: event_task,
        }
    }

    pub async fn seed_fundraiser(&self, kind: FundraiserKind, owner_id: Uuid) -> fundraiser::Model {
        fundraiser::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(kind),
            name: Set(format!("Test {}", kind)),
            owner_id: Set(owner_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("insert fundraiser")
    }

    pub async fn seed_volunteer(
        &self,
        fundraiser_id: Uuid,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> volunteer_signup::Model {
        volunteer_signup::ActiveModel {
            id: Set(Uuid::new_v4()),
            fundraiser_id: Set(fundraiser_id),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            phone: Set(phone.map(str::to_string)),
            role: Set(Some("usher".to_string())),
            shift: Set(Some("evening".to_string())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("insert volunteer")
    }

    pub async fn checkout(
        &self,
        fundraiser: &fundraiser::Model,
        processor: Processor,
        reference: &str,
        gross: i64,
    ) -> transaction::Model {
        let subject_kind = match fundraiser.kind {
            FundraiserKind::Campaign => SubjectKind::Donation,
            FundraiserKind::Event => SubjectKind::Ticket,
        };
        let (txn, _) = self
            .state
            .ledger
            .record_checkout(NewTransaction {
                processor,
                processor_reference: reference.to_string(),
                fundraiser_id: fundraiser.id,
                subject_kind,
                gross_amount: gross,
                currency: Some("USD".to_string()),
                payer_name: Some("John Doe".to_string()),
                payer_email: Some("john@x.com".to_string()),
            })
            .await
            .expect("record checkout");
        txn
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        actor: Option<&Actor>,
        headers: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header("x-actor-id", actor.id.to_string())
                .header("x-actor-role", actor.role.to_string());
        }
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = match body {
            Some(bytes) => builder
                .header("content-type", "application/json")
                .body(Body::from(bytes)),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        actor: Option<&Actor>,
        body: Option<Value>,
    ) -> Response {
        let bytes = body.map(|b| serde_json::to_vec(&b).expect("json body"));
        self.request(method, uri, actor, &[], bytes).await
    }

    /// Posts a correctly signed card gateway event.
    pub async fn gateway_webhook(&self, event: &Value) -> Response {
        let body = serde_json::to_vec(event).expect("json body");
        let signature = CardGatewayAdapter::new(GATEWAY_SECRET).sign(&body);
        self.request(
            Method::POST,
            "/api/v1/webhooks/card_gateway",
            None,
            &[(card_gateway::SIGNATURE_HEADER, signature)],
            Some(body),
        )
        .await
    }

    /// Posts a correctly signed Stripe event.
    pub async fn stripe_webhook(&self, event: &Value) -> Response {
        let body = serde_json::to_vec(event).expect("json body");
        let signature = StripeAdapter::new(STRIPE_SECRET, 300).sign(Utc::now().timestamp(), &body);
        self.request(
            Method::POST,
            "/api/v1/webhooks/stripe",
            None,
            &[(stripe::SIGNATURE_HEADER, signature)],
            Some(body),
        )
        .await
    }

    /// Posts a correctly signed PayPal event.
    pub async fn paypal_webhook(&self, transmission_id: &str, event: &Value) -> Response {
        let body = serde_json::to_vec(event).expect("json body");
        let time = Utc::now().to_rfc3339();
        let signature =
            PaypalAdapter::new(PAYPAL_SECRET, PAYPAL_WEBHOOK_ID, 300).sign(transmission_id, &time, &body);
        self.request(
            Method::POST,
            "/api/v1/webhooks/paypal",
            None,
            &[
                (paypal::TRANSMISSION_ID_HEADER, transmission_id.to_string()),
                (paypal::TRANSMISSION_TIME_HEADER, time),
                (paypal::TRANSMISSION_SIG_HEADER, signature),
            ],
            Some(body),
        )
        .await
    }
}

pub fn gateway_event(event_id: &str, kind: &str, reference: &str, amount: i64) -> Value {
    serde_json::json!({
        "id": event_id,
        "type": kind,
        "data": {
            "reference": reference,
            "amount": amount,
            "currency": "usd"
        }
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
