//! Applies verified processor events to the ledger.
//!
//! Every delivery is handled in one database transaction that
//!
//! 1. inserts the `(processor, event_id)` idempotency marker, stopping early
//!    if the marker already exists,
//! 2. loads the transaction row (row-locked on Postgres, and always under the
//!    in-process lock for its processor reference),
//! 3. applies the status transition and, on capture, the final fees,
//! 4. records the outcome on the marker.
//!
//! A failure anywhere rolls back all of it, so a status never changes without
//! its marker and fees never change without a status change. Duplicate and
//! out-of-order deliveries are acknowledged as no-ops.

use super::{EventKind, NormalizedEvent, WebhookAdapters};
use crate::{
    entities::{transaction, webhook_event, Processor, Transaction, TransactionStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fees::{compute_fees, compute_fees_with_reported, FeeBreakdown, FeeConfig},
        keyed_lock::KeyedLocks,
        ledger::ledger_lock_key,
    },
};
use axum::http::HeaderMap;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const OUTCOME_RECEIVED: &str = "received";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// Event already processed, or the transaction is already in the target state
    Duplicate,
    /// Transition not in the table, e.g. a capture after a refund
    OutOfOrder {
        current: TransactionStatus,
        attempted: TransactionStatus,
    },
    /// Refund for less than the gross amount
    UnsupportedPartialRefund,
    /// Event type that does not affect the ledger
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::OutOfOrder { .. } => "out_of_order",
            WebhookOutcome::UnsupportedPartialRefund => "unsupported_partial_refund",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Body of the 200 acknowledgment sent back to the processor.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub processor: Processor,
    pub event_id: Option<String>,
    pub transaction_id: Option<Uuid>,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    db: Arc<DatabaseConnection>,
    adapters: WebhookAdapters,
    fees: Arc<FeeConfig>,
    locks: KeyedLocks,
    events: EventSender,
}

impl WebhookReconciler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        adapters: WebhookAdapters,
        fees: Arc<FeeConfig>,
        locks: KeyedLocks,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            adapters,
            fees,
            locks,
            events,
        }
    }

    pub fn configured_processors(&self) -> Vec<Processor> {
        self.adapters.configured()
    }

    /// Verifies and applies one raw delivery.
    #[instrument(skip(self, headers, body), fields(processor = %processor))]
    pub async fn handle(
        &self,
        processor: Processor,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookAck, ServiceError> {
        let adapter = self.adapters.get(processor).ok_or_else(|| {
            ServiceError::Configuration(format!("no webhook secret configured for {}", processor))
        })?;

        if let Err(err) = adapter.verify(headers, body) {
            warn!(
                processor = %processor,
                error = %err,
                body_len = body.len(),
                "Rejected webhook with failed signature verification"
            );
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }

        let event = match adapter.parse(headers, body) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(processor = %processor, "Ignoring webhook event type without ledger effect");
                return Ok(WebhookAck {
                    received: true,
                    processor,
                    event_id: None,
                    transaction_id: None,
                    outcome: WebhookOutcome::Ignored,
                });
            }
            Err(err) => {
                warn!(processor = %processor, error = %err, "Verified webhook has an unusable payload");
                return Err(ServiceError::BadRequest(err.to_string()));
            }
        };

        self.apply(processor, event).await
    }

    /// Applies an already verified, normalized event.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, reference = %event.processor_reference, kind = %event.kind))]
    pub async fn apply(
        &self,
        processor: Processor,
        event: NormalizedEvent,
    ) -> Result<WebhookAck, ServiceError> {
        let _guard = self
            .locks
            .acquire(&ledger_lock_key(processor, &event.processor_reference))
            .await;

        let txn = self.db.begin().await?;

        let marker_id = Uuid::new_v4();
        if !insert_marker(&txn, marker_id, processor, &event).await? {
            txn.rollback().await?;
            info!(
                processor = %processor,
                event_id = %event.event_id,
                reference = %event.processor_reference,
                "Discarding duplicate webhook delivery"
            );
            return Ok(WebhookAck {
                received: true,
                processor,
                event_id: Some(event.event_id),
                transaction_id: None,
                outcome: WebhookOutcome::Duplicate,
            });
        }

        let mut query = Transaction::find()
            .filter(transaction::Column::Processor.eq(processor))
            .filter(transaction::Column::ProcessorReference.eq(event.processor_reference.as_str()));
        if txn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let Some(current) = query.one(&txn).await? else {
            txn.rollback().await?;
            // Not acknowledged: the processor retries once checkout is recorded.
            warn!(
                processor = %processor,
                event_id = %event.event_id,
                reference = %event.processor_reference,
                "Webhook for unknown transaction"
            );
            return Err(ServiceError::NotFound(format!(
                "No transaction for {} reference {}",
                processor, event.processor_reference
            )));
        };

        let (outcome, fees) = self.transition(&txn, &current, &event).await?;

        webhook_event::ActiveModel {
            id: Set(marker_id),
            transaction_id: Set(Some(current.id)),
            outcome: Set(outcome.as_str().to_string()),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        txn.commit().await?;

        self.log_outcome(processor, &event, &current, outcome);
        if let WebhookOutcome::Applied { to, .. } = outcome {
            self.publish(&current, to, fees);
        }

        Ok(WebhookAck {
            received: true,
            processor,
            event_id: Some(event.event_id),
            transaction_id: Some(current.id),
            outcome,
        })
    }

    async fn transition(
        &self,
        txn: &DatabaseTransaction,
        current: &transaction::Model,
        event: &NormalizedEvent,
    ) -> Result<(WebhookOutcome, Option<FeeBreakdown>), ServiceError> {
        let target = match event.kind {
            EventKind::Captured => TransactionStatus::Succeeded,
            EventKind::Denied => TransactionStatus::Failed,
            EventKind::Refunded => TransactionStatus::Refunded,
        };

        if current.status == target {
            return Ok((WebhookOutcome::Duplicate, None));
        }
        if !current.status.can_transition_to(target) {
            return Ok((
                WebhookOutcome::OutOfOrder {
                    current: current.status,
                    attempted: target,
                },
                None,
            ));
        }

        if let Some(currency) = &event.currency {
            if !currency.eq_ignore_ascii_case(&current.currency) {
                return Err(ServiceError::ValidationError(format!(
                    "event currency {} does not match ledger currency {}",
                    currency, current.currency
                )));
            }
        }

        if target == TransactionStatus::Refunded {
            if let Some(refunded) = event.refunded_amount {
                if refunded < current.gross_amount {
                    return Ok((WebhookOutcome::UnsupportedPartialRefund, None));
                }
            }
        }

        let now = Utc::now();
        let mut update = Transaction::update_many()
            .col_expr(transaction::Column::Status, Expr::value(target))
            .col_expr(transaction::Column::UpdatedAt, Expr::value(now));

        let mut applied_fees = None;
        if target == TransactionStatus::Succeeded {
            let gross = event.captured_amount.unwrap_or(current.gross_amount);
            let fees = match event.processor_fee {
                Some(reported) => compute_fees_with_reported(&self.fees, gross, reported)?,
                None => compute_fees(&self.fees, gross, &current.currency, current.processor)?,
            };
            update = update
                .col_expr(transaction::Column::GrossAmount, Expr::value(fees.gross_amount))
                .col_expr(
                    transaction::Column::PlatformFeeAmount,
                    Expr::value(fees.platform_fee),
                )
                .col_expr(
                    transaction::Column::ProcessorFeeAmount,
                    Expr::value(fees.processor_fee),
                )
                .col_expr(transaction::Column::NetAmount, Expr::value(fees.net_amount));
            applied_fees = Some(fees);
        }

        let result = update
            .filter(transaction::Column::Id.eq(current.id))
            .filter(transaction::Column::Status.eq(current.status))
            .exec(txn)
            .await?;
        if result.rows_affected != 1 {
            return Err(ServiceError::Conflict(format!(
                "transaction {} changed concurrently",
                current.id
            )));
        }

        Ok((
            WebhookOutcome::Applied {
                from: current.status,
                to: target,
            },
            applied_fees,
        ))
    }

    fn log_outcome(
        &self,
        processor: Processor,
        event: &NormalizedEvent,
        current: &transaction::Model,
        outcome: WebhookOutcome,
    ) {
        match outcome {
            WebhookOutcome::Applied { from, to } => {
                info!(
                    processor = %processor,
                    event_id = %event.event_id,
                    transaction_id = %current.id,
                    %from,
                    %to,
                    "Webhook transition applied"
                );
                if to == TransactionStatus::Refunded {
                    if let Some(payout_id) = current.payout_id {
                        warn!(
                            transaction_id = %current.id,
                            %payout_id,
                            gross = current.gross_amount,
                            "Refund received for a transaction that was already paid out"
                        );
                    }
                }
            }
            WebhookOutcome::Duplicate => info!(
                processor = %processor,
                event_id = %event.event_id,
                transaction_id = %current.id,
                status = %current.status,
                "Transaction already in target state; webhook discarded"
            ),
            WebhookOutcome::OutOfOrder { current: state, attempted } => warn!(
                processor = %processor,
                event_id = %event.event_id,
                transaction_id = %current.id,
                current = %state,
                attempted = %attempted,
                "Out-of-order webhook ignored"
            ),
            WebhookOutcome::UnsupportedPartialRefund => warn!(
                processor = %processor,
                event_id = %event.event_id,
                transaction_id = %current.id,
                refunded = event.refunded_amount,
                gross = current.gross_amount,
                "Partial refund recorded without a status change"
            ),
            WebhookOutcome::Ignored => {}
        }
    }

    /// `fees` is the breakdown written by a capture; `current` still holds
    /// the checkout estimate.
    fn publish(&self, current: &transaction::Model, to: TransactionStatus, fees: Option<FeeBreakdown>) {
        let event = match to {
            TransactionStatus::Succeeded => Event::PaymentCaptured {
                transaction_id: current.id,
                fundraiser_id: current.fundraiser_id,
                processor: current.processor,
                gross_amount: fees.map_or(current.gross_amount, |f| f.gross_amount),
                net_amount: fees.map_or(current.net_amount, |f| f.net_amount),
                currency: current.currency.clone(),
            },
            TransactionStatus::Failed => Event::PaymentFailed {
                transaction_id: current.id,
                fundraiser_id: current.fundraiser_id,
                processor: current.processor,
                reason: "processor_denied".to_string(),
            },
            TransactionStatus::Refunded => Event::PaymentRefunded {
                transaction_id: current.id,
                fundraiser_id: current.fundraiser_id,
                processor: current.processor,
                gross_amount: current.gross_amount,
                currency: current.currency.clone(),
            },
            TransactionStatus::Pending => return,
        };
        self.events.publish(event);
    }
}

/// Inserts the idempotency marker. Returns false if the event was seen before.
async fn insert_marker(
    txn: &DatabaseTransaction,
    id: Uuid,
    processor: Processor,
    event: &NormalizedEvent,
) -> Result<bool, ServiceError> {
    let marker = webhook_event::ActiveModel {
        id: Set(id),
        processor: Set(processor),
        event_id: Set(event.event_id.clone()),
        event_kind: Set(event.kind.to_string()),
        processor_reference: Set(event.processor_reference.clone()),
        transaction_id: Set(None),
        outcome: Set(OUTCOME_RECEIVED.to_string()),
        received_at: Set(Utc::now()),
    };

    let inserted = webhook_event::Entity::insert(marker)
        .on_conflict(
            OnConflict::columns([webhook_event::Column::Processor, webhook_event::Column::EventId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;

    Ok(inserted == 1)
}
