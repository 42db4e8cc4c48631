mod common;

use axum::http::{Method, StatusCode};
use fundraiser_ledger::{auth::Actor, entities::FundraiserKind};
use serde_json::json;
use uuid::Uuid;

use common::{response_json, TestApp};

#[tokio::test]
async fn liveness_and_readiness() {
    let app = TestApp::new().await;

    let health = app.request(Method::GET, "/api/v1/health", None, &[], None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(response_json(health).await["status"], "up");

    let status = app.request(Method::GET, "/api/v1/status", None, &[], None).await;
    assert_eq!(status.status(), StatusCode::OK);
    let body = response_json(status).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["database"]["up"], true);
    assert_eq!(body["environment"], "test");
    let processors = body["webhook_processors"].as_array().unwrap();
    assert_eq!(processors.len(), 3);
    assert!(processors.contains(&json!("card_gateway")));
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, &[], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/v1/webhooks/{processor}"));
    assert!(paths.contains_key("/api/v1/payouts/cashout"));
    assert!(paths.contains_key("/api/v1/exports/{kind}"));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            "/api/v1/health",
            None,
            &[("x-request-id", "trace-abc".to_string())],
            None,
        )
        .await;
    assert_eq!(response.headers()["x-request-id"], "trace-abc");

    let generated = app.request(Method::GET, "/api/v1/health", None, &[], None).await;
    assert!(generated.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn protected_routes_require_actor_headers() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;

    let anonymous = app
        .request_json(
            Method::GET,
            &format!("/api/v1/fundraisers/{}/payout-summary", campaign.id),
            None,
            None,
        )
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let bad_role = app
        .request(
            Method::GET,
            &format!("/api/v1/fundraisers/{}/payout-summary", campaign.id),
            None,
            &[
                ("x-actor-id", Uuid::new_v4().to_string()),
                ("x-actor-role", "donor".to_string()),
            ],
            None,
        )
        .await;
    assert_eq!(bad_role.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(bad_role).await;
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn checkout_recording_is_idempotent_per_reference() {
    let app = TestApp::new().await;
    let owner = Actor::organizer(Uuid::new_v4());
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, owner.id).await;

    let payload = json!({
        "processor": "stripe",
        "processor_reference": "pi_http_1",
        "fundraiser_id": campaign.id,
        "subject_kind": "donation",
        "gross_amount": 2_000,
        "payer_name": "Pat Doe",
        "payer_email": "pat@example.com"
    });

    let created = app
        .request_json(Method::POST, "/api/v1/transactions", None, Some(payload.clone()))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = response_json(created).await;
    let txn = &created["data"];
    assert_eq!(txn["status"], "pending");
    assert_eq!(txn["currency"], "USD");
    // Estimated fees until the processor confirms the capture.
    assert_eq!(
        txn["platform_fee_amount"].as_i64().unwrap()
            + txn["processor_fee_amount"].as_i64().unwrap()
            + txn["net_amount"].as_i64().unwrap(),
        2_000
    );

    let again = app
        .request_json(Method::POST, "/api/v1/transactions", None, Some(payload))
        .await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(response_json(again).await["data"]["id"], txn["id"]);

    let uri = format!("/api/v1/transactions/{}", txn["id"].as_str().unwrap());
    let owner_view = app.request_json(Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(owner_view.status(), StatusCode::OK);

    let stranger = Actor::organizer(Uuid::new_v4());
    let stranger_view = app.request_json(Method::GET, &uri, Some(&stranger), None).await;
    assert_eq!(stranger_view.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn checkout_validation_errors() {
    let app = TestApp::new().await;
    let campaign = app.seed_fundraiser(FundraiserKind::Campaign, Uuid::new_v4()).await;

    let negative = app
        .request_json(
            Method::POST,
            "/api/v1/transactions",
            None,
            Some(json!({
                "processor": "card_gateway",
                "processor_reference": "gw_neg",
                "fundraiser_id": campaign.id,
                "subject_kind": "donation",
                "gross_amount": -5
            })),
        )
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let unknown_fundraiser = app
        .request_json(
            Method::POST,
            "/api/v1/transactions",
            None,
            Some(json!({
                "processor": "card_gateway",
                "processor_reference": "gw_orphan",
                "fundraiser_id": Uuid::new_v4(),
                "subject_kind": "donation",
                "gross_amount": 100
            })),
        )
        .await;
    assert_eq!(unknown_fundraiser.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_sweep_endpoint_is_operator_only() {
    let app = TestApp::new().await;
    let organizer = Actor::organizer(Uuid::new_v4());
    let operator = Actor::operator(Uuid::new_v4());

    let denied = app
        .request_json(Method::POST, "/api/v1/transactions/expire-stale", Some(&organizer), None)
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let swept = app
        .request_json(Method::POST, "/api/v1/transactions/expire-stale", Some(&operator), None)
        .await;
    assert_eq!(swept.status(), StatusCode::OK);
    assert_eq!(response_json(swept).await["data"]["expired"], json!([]));
}
