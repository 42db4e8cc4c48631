mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use fundraiser_ledger::{
    entities::{transaction, FundraiserKind, Processor, SettlementStatus, Transaction, TransactionStatus},
    errors::ServiceError,
    events::Event,
    webhooks::{EventKind, NormalizedEvent, WebhookOutcome},
};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::json;
use uuid::Uuid;

use common::{gateway_event, response_json, test_config, TestApp};

async fn reload(app: &TestApp, id: Uuid) -> transaction::Model {
    Transaction::find_by_id(id)
        .one(&*app.db)
        .await
        .expect("query")
        .expect("transaction exists")
}

#[tokio::test]
async fn card_gateway_capture_applies_fees_once() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_ref_1", 10_000).await;
    assert_eq!(txn.status, TransactionStatus::Pending);

    let event = gateway_event("gwevt_1", "payment.captured", "gw_ref_1", 10_000);
    let first = app.gateway_webhook(&event).await;
    assert_eq!(first.status(), StatusCode::OK);
    let body = response_json(first).await;
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["from"], "pending");
    assert_eq!(body["to"], "succeeded");

    let stored = reload(&app, txn.id).await;
    assert_eq!(stored.status, TransactionStatus::Succeeded);
    assert_eq!(stored.platform_fee_amount, 899);
    assert_eq!(stored.processor_fee_amount, 340);
    assert_eq!(stored.net_amount, 8_761);
    assert_eq!(
        stored.gross_amount,
        stored.platform_fee_amount + stored.processor_fee_amount + stored.net_amount
    );

    // Same delivery again: acknowledged, nothing changes.
    let replay = app.gateway_webhook(&event).await;
    assert_eq!(replay.status(), StatusCode::OK);
    assert_eq!(response_json(replay).await["outcome"], "duplicate");

    // A second capture event for the same payment is also a no-op.
    let second_capture = gateway_event("gwevt_2", "payment.captured", "gw_ref_1", 10_000);
    let body = response_json(app.gateway_webhook(&second_capture).await).await;
    assert_eq!(body["outcome"], "duplicate");

    assert_eq!(Transaction::find().count(&*app.db).await.unwrap(), 1);
    assert_eq!(reload(&app, txn.id).await, stored);
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_apply_exactly_once() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_race", 2_500).await;

    let event = NormalizedEvent {
        event_id: "gwevt_race".into(),
        processor_reference: "gw_race".into(),
        kind: EventKind::Captured,
        captured_amount: Some(2_500),
        processor_fee: None,
        refunded_amount: None,
        currency: Some("USD".into()),
    };

    let deliveries = (0..8).map(|_| {
        app.state
            .reconciler
            .apply(Processor::CardGateway, event.clone())
    });
    let results = futures::future::join_all(deliveries).await;

    let applied = results
        .iter()
        .filter(|r| matches!(r, Ok(ack) if matches!(ack.outcome, WebhookOutcome::Applied { .. })))
        .count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Ok(ack) if ack.outcome == WebhookOutcome::Duplicate))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Succeeded);
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_mutation() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_forged", 10_000).await;

    let body = serde_json::to_vec(&gateway_event("gwevt_f", "payment.captured", "gw_forged", 10_000))
        .unwrap();
    let response = app
        .request(
            Method::POST,
            "/api/v1/webhooks/card_gateway",
            None,
            &[("x-gateway-signature", "00".repeat(32))],
            Some(body),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn refund_then_late_capture_is_out_of_order() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_refund", 5_000).await;

    app.gateway_webhook(&gateway_event("e1", "payment.captured", "gw_refund", 5_000))
        .await;
    let refund = response_json(
        app.gateway_webhook(&gateway_event("e2", "refund.processed", "gw_refund", 5_000))
            .await,
    )
    .await;
    assert_eq!(refund["outcome"], "applied");
    assert_eq!(refund["to"], "refunded");

    let late = app
        .gateway_webhook(&gateway_event("e3", "payment.captured", "gw_refund", 5_000))
        .await;
    assert_eq!(late.status(), StatusCode::OK);
    let late = response_json(late).await;
    assert_eq!(late["outcome"], "out_of_order");
    assert_eq!(late["current"], "refunded");

    let stored = reload(&app, txn.id).await;
    assert_eq!(stored.status, TransactionStatus::Refunded);
    // Refunds do not touch the settlement axis.
    assert_eq!(stored.settlement_status, SettlementStatus::Pending);
}

#[tokio::test]
async fn partial_refund_is_recorded_without_transition() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_partial", 5_000).await;
    app.gateway_webhook(&gateway_event("p1", "payment.captured", "gw_partial", 5_000))
        .await;

    let body = response_json(
        app.gateway_webhook(&gateway_event("p2", "refund.processed", "gw_partial", 1_000))
            .await,
    )
    .await;
    assert_eq!(body["outcome"], "unsupported_partial_refund");
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Succeeded);
}

#[tokio::test]
async fn denied_payment_fails_transaction() {
    let app = TestApp::new().await;
    let event = app.seed_fundraiser(FundraiserKind::Event, Uuid::new_v4()).await;
    let txn = app.checkout(&event, Processor::CardGateway, "gw_denied", 3_000).await;

    let body = response_json(
        app.gateway_webhook(&gateway_event("d1", "payment.failed", "gw_denied", 3_000))
            .await,
    )
    .await;
    assert_eq!(body["to"], "failed");
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn unknown_reference_is_retried_until_checkout_exists() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let event = gateway_event("early_1", "payment.captured", "gw_early", 1_000);

    let early = app.gateway_webhook(&event).await;
    assert_eq!(early.status(), StatusCode::NOT_FOUND);

    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_early", 1_000).await;
    let retry = response_json(app.gateway_webhook(&event).await).await;
    assert_eq!(retry["outcome"], "applied");
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Succeeded);
}

#[tokio::test]
async fn unrecognised_event_type_is_ignored() {
    let app = TestApp::new().await;
    let body = response_json(
        app.gateway_webhook(&gateway_event("x1", "payout.created", "whatever", 1))
            .await,
    )
    .await;
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn unconfigured_processor_refuses_webhooks() {
    let mut cfg = test_config();
    cfg.stripe_webhook_secret = None;
    let app = TestApp::with_config(cfg).await;

    let response = app
        .stripe_webhook(&json!({"id": "evt_1", "type": "payment_intent.succeeded"}))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let unknown = app
        .request(Method::POST, "/api/v1/webhooks/venmo", None, &[], Some(b"{}".to_vec()))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stripe_capture_uses_reported_fee() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::Stripe, "pi_123", 10_000).await;

    let event = json!({
        "id": "evt_succeeded",
        "type": "charge.succeeded",
        "data": {
            "object": {
                "id": "ch_1",
                "payment_intent": "pi_123",
                "amount": 10_000,
                "amount_captured": 10_000,
                "currency": "usd",
                "balance_transaction": { "fee": 320 }
            }
        }
    });
    let body = response_json(app.stripe_webhook(&event).await).await;
    assert_eq!(body["outcome"], "applied");

    let stored = reload(&app, txn.id).await;
    assert_eq!(stored.processor_fee_amount, 320);
    assert_eq!(stored.platform_fee_amount, 899);
    assert_eq!(stored.net_amount, 10_000 - 899 - 320);
}

#[tokio::test]
async fn paypal_capture_by_order_id() {
    let app = TestApp::new().await;
    let event = app.seed_fundraiser(FundraiserKind::Event, Uuid::new_v4()).await;
    let txn = app.checkout(&event, Processor::Paypal, "ORDER-42", 2_000).await;

    let payload = json!({
        "id": "WH-EVT-1",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": "CAPTURE-1",
            "amount": { "currency_code": "USD", "value": "20.00" },
            "supplementary_data": { "related_ids": { "order_id": "ORDER-42" } }
        }
    });
    let response = app.paypal_webhook("tx-1", &payload).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Succeeded);
}

#[tokio::test]
async fn currency_mismatch_rolls_back() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_eur", 1_000).await;

    let result = app
        .state
        .reconciler
        .apply(
            Processor::CardGateway,
            NormalizedEvent {
                event_id: "eur_1".into(),
                processor_reference: "gw_eur".into(),
                kind: EventKind::Captured,
                captured_amount: Some(1_000),
                processor_fee: None,
                refunded_amount: None,
                currency: Some("EUR".into()),
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    assert_eq!(reload(&app, txn.id).await.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn stale_pending_transactions_are_expired() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let fresh = app.checkout(&campaign, Processor::CardGateway, "gw_fresh", 1_000).await;
    let old = app.checkout(&campaign, Processor::CardGateway, "gw_old", 1_000).await;

    let mut aged: transaction::ActiveModel = old.clone().into();
    aged.created_at = Set(Utc::now() - chrono::Duration::days(3));
    aged.update(&*app.db).await.unwrap();

    let report = app
        .state
        .ledger
        .expire_stale_pending(chrono::Duration::hours(48))
        .await
        .unwrap();
    assert_eq!(report.expired, vec![old.id]);
    assert_eq!(reload(&app, old.id).await.status, TransactionStatus::Failed);
    assert_eq!(reload(&app, fresh.id).await.status, TransactionStatus::Pending);

    // A capture arriving after expiry cannot resurrect the transaction.
    let late = response_json(
        app.gateway_webhook(&gateway_event("late", "payment.captured", "gw_old", 1_000))
            .await,
    )
    .await;
    assert_eq!(late["outcome"], "out_of_order");
}

#[tokio::test]
async fn capture_event_carries_the_recomputed_net() {
    let (app, mut events) = TestApp::capturing_events().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;
    let txn = app.checkout(&campaign, Processor::CardGateway, "gw_evt_net", 10_000).await;

    let mut event = gateway_event("gwevt_net", "payment.captured", "gw_evt_net", 10_000);
    event["data"]["fee"] = json!(500);
    assert_eq!(app.gateway_webhook(&event).await.status(), StatusCode::OK);

    let stored = reload(&app, txn.id).await;
    assert_eq!(stored.net_amount, 10_000 - 899 - 500);
    assert_ne!(stored.net_amount, txn.net_amount);

    let mut captured = None;
    while let Ok(published) = events.try_recv() {
        if let Event::PaymentCaptured { .. } = published {
            captured = Some(published);
        }
    }
    assert_matches!(
        captured,
        Some(Event::PaymentCaptured { transaction_id, gross_amount: 10_000, net_amount, .. })
            if transaction_id == txn.id && net_amount == stored.net_amount
    );
}
