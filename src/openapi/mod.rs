use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fundraiser Ledger API",
        version = "1.0.0",
        description = r#"
# Fundraiser Ledger

Payment ledger for campaign donations and event tickets collected through
Stripe, PayPal and a card gateway.

## Callers

- Processors post signed webhooks to `/webhooks/{processor}`.
- The organizer UI records checkouts, reads payout summaries and requests cash-outs.
- Operators reconcile settlement statements and complete or fail payouts.

The upstream auth gateway identifies the caller with `x-actor-id` (UUID) and
`x-actor-role` (`organizer` or `operator`).

## Amounts

All amounts in JSON are integer minor units (cents). CSV exports render
major units.

## Error Handling

```json
{
  "error": "Forbidden",
  "message": "only the fundraiser owner may request a cash-out",
  "request_id": "5f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Webhooks", description = "Processor webhook intake"),
        (name = "Transactions", description = "Checkout recording and ledger lookups"),
        (name = "Settlements", description = "Processor settlement statements"),
        (name = "Payouts", description = "Payout aggregation and cash-out"),
        (name = "Exports", description = "CSV exports with redaction"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::webhooks::receive_webhook,
        crate::handlers::transactions::record_checkout,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::expire_stale,
        crate::handlers::settlements::reconcile_settlements,
        crate::handlers::payouts::payout_summary,
        crate::handlers::payouts::create_payout,
        crate::handlers::payouts::get_payout,
        crate::handlers::payouts::request_cashout,
        crate::handlers::payouts::update_payout_status,
        crate::handlers::payouts::list_cashout_requests,
        crate::handlers::exports::export,
        crate::handlers::health::liveness,
        crate::handlers::health::status,
    ),
    components(
        schemas(
            crate::entities::transaction::Model,
            crate::entities::payout::Model,
            crate::entities::cashout_request::Model,
            crate::entities::Processor,
            crate::entities::SubjectKind,
            crate::entities::TransactionStatus,
            crate::entities::SettlementStatus,
            crate::entities::PayoutStatus,
            crate::entities::PayoutMethod,
            crate::services::ledger::NewTransaction,
            crate::services::ledger::SweepReport,
            crate::services::settlement::SettlementStatement,
            crate::services::settlement::StatementEntry,
            crate::services::settlement::SettlementReport,
            crate::services::payouts::PayoutSummary,
            crate::services::payouts::CurrencySummary,
            crate::services::payouts::PayoutTotals,
            crate::services::payouts::CreatePayout,
            crate::services::payouts::CashoutInput,
            crate::services::payouts::CashoutReceipt,
            crate::services::payouts::UpdatePayoutStatus,
            crate::services::exports::ExportKind,
            crate::services::redaction::PrivacyMode,
            crate::webhooks::WebhookAck,
            crate::webhooks::WebhookOutcome,
            crate::handlers::health::StatusResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
