//! Transaction ledger: checkout recording, lookups and the stale-pending sweep.
//!
//! A transaction row is created once per `(processor, processor_reference)`
//! when checkout starts and afterwards only moves along the status table in
//! [`TransactionStatus::can_transition_to`]. Rows are never deleted.

use crate::{
    auth::Actor,
    entities::{
        fundraiser, transaction, Fundraiser, FundraiserKind, Processor, SettlementStatus,
        SubjectKind, Transaction, TransactionStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fees::{compute_fees, FeeConfig},
        keyed_lock::KeyedLocks,
    },
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Lock key serializing every write to one ledger row.
pub fn ledger_lock_key(processor: Processor, processor_reference: &str) -> String {
    format!("txn:{}:{}", processor, processor_reference)
}

pub(crate) fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("currency"))
    }
}

/// Checkout started by the organizer UI.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewTransaction {
    pub processor: Processor,
    #[validate(length(min = 1, max = 255))]
    pub processor_reference: String,
    pub fundraiser_id: Uuid,
    pub subject_kind: SubjectKind,
    /// Minor units
    #[validate(range(min = 0))]
    pub gross_amount: i64,
    #[validate(custom = "validate_currency")]
    pub currency: Option<String>,
    #[validate(length(max = 255))]
    pub payer_name: Option<String>,
    #[validate(email)]
    pub payer_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TransactionFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub settlement_status: Option<SettlementStatus>,
    pub status: Option<TransactionStatus>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub expired: Vec<Uuid>,
}

#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DatabaseConnection>,
    fees: Arc<FeeConfig>,
    default_currency: String,
    locks: KeyedLocks,
    events: EventSender,
}

impl LedgerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        fees: Arc<FeeConfig>,
        default_currency: String,
        locks: KeyedLocks,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            fees,
            default_currency,
            locks,
            events,
        }
    }

    /// Creates a pending transaction with quoted fees, or returns the row
    /// already recorded for the same processor reference. The flag is true
    /// when a new row was created.
    #[instrument(skip(self, input), fields(processor = %input.processor, reference = %input.processor_reference))]
    pub async fn record_checkout(
        &self,
        input: NewTransaction,
    ) -> Result<(transaction::Model, bool), ServiceError> {
        input.validate()?;

        let guard = self
            .locks
            .acquire(&ledger_lock_key(input.processor, &input.processor_reference))
            .await;

        if let Some(existing) = self
            .find_by_reference(input.processor, &input.processor_reference)
            .await?
        {
            info!(transaction_id = %existing.id, "Checkout already recorded");
            return Ok((existing, false));
        }

        let fundraiser = Fundraiser::find_by_id(input.fundraiser_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Fundraiser {} not found", input.fundraiser_id))
            })?;
        check_subject(&fundraiser, input.subject_kind)?;

        let currency = input
            .currency
            .as_deref()
            .unwrap_or(&self.default_currency)
            .to_ascii_uppercase();
        let fees = compute_fees(&self.fees, input.gross_amount, &currency, input.processor)?;

        let now = Utc::now();
        let model = transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            processor: Set(input.processor),
            processor_reference: Set(input.processor_reference.clone()),
            fundraiser_id: Set(fundraiser.id),
            subject_kind: Set(input.subject_kind),
            gross_amount: Set(fees.gross_amount),
            currency: Set(currency),
            platform_fee_amount: Set(fees.platform_fee),
            processor_fee_amount: Set(fees.processor_fee),
            net_amount: Set(fees.net_amount),
            status: Set(TransactionStatus::Pending),
            settlement_status: Set(SettlementStatus::Pending),
            payer_name: Set(input.payer_name),
            payer_email: Set(input.payer_email),
            payout_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = match model.insert(&*self.db).await {
            Ok(inserted) => inserted,
            Err(err) => {
                // Another instance may have won the unique index race.
                if let Some(existing) = self
                    .find_by_reference(input.processor, &input.processor_reference)
                    .await?
                {
                    return Ok((existing, false));
                }
                return Err(err.into());
            }
        };
        drop(guard);

        info!(
            transaction_id = %inserted.id,
            fundraiser_id = %inserted.fundraiser_id,
            gross = inserted.gross_amount,
            currency = %inserted.currency,
            "Checkout recorded"
        );
        Ok((inserted, true))
    }

    pub async fn find_by_reference(
        &self,
        processor: Processor,
        processor_reference: &str,
    ) -> Result<Option<transaction::Model>, ServiceError> {
        Ok(Transaction::find()
            .filter(transaction::Column::Processor.eq(processor))
            .filter(transaction::Column::ProcessorReference.eq(processor_reference))
            .one(&*self.db)
            .await?)
    }

    /// Loads a transaction the actor is allowed to see.
    pub async fn get_transaction(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<transaction::Model, ServiceError> {
        let found = Transaction::find_by_id(id)
            .find_also_related(Fundraiser)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        match found {
            (txn, Some(owner)) if actor.can_access(owner.owner_id) => Ok(txn),
            (txn, _) => {
                warn!(actor_id = %actor.id, transaction_id = %txn.id, "Transaction access denied");
                Err(ServiceError::Forbidden(
                    "not allowed to view this transaction".to_string(),
                ))
            }
        }
    }

    /// Fails every pending transaction created before `now - max_age`.
    /// Each row is updated only if it is still pending at write time, so a
    /// capture that lands during the sweep wins.
    #[instrument(skip(self))]
    pub async fn expire_stale_pending(&self, max_age: Duration) -> Result<SweepReport, ServiceError> {
        let cutoff = Utc::now() - max_age;
        let stale = Transaction::find()
            .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
            .filter(transaction::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut expired = Vec::new();
        for txn in stale {
            let _guard = self
                .locks
                .acquire(&ledger_lock_key(txn.processor, &txn.processor_reference))
                .await;

            let result = Transaction::update_many()
                .col_expr(
                    transaction::Column::Status,
                    Expr::value(TransactionStatus::Failed),
                )
                .col_expr(transaction::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transaction::Column::Id.eq(txn.id))
                .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 1 {
                warn!(
                    transaction_id = %txn.id,
                    processor = %txn.processor,
                    reference = %txn.processor_reference,
                    created_at = %txn.created_at,
                    "Pending transaction expired without a processor webhook"
                );
                self.events.publish(Event::PaymentFailed {
                    transaction_id: txn.id,
                    fundraiser_id: txn.fundraiser_id,
                    processor: txn.processor,
                    reason: "pending_timeout".to_string(),
                });
                expired.push(txn.id);
            }
        }

        info!(expired = expired.len(), %cutoff, "Stale pending sweep finished");
        Ok(SweepReport { cutoff, expired })
    }
}

/// Transactions of one fundraiser matching `filter`, newest first.
pub(crate) async fn fundraiser_transactions<C: ConnectionTrait>(
    conn: &C,
    fundraiser_id: Uuid,
    filter: &TransactionFilter,
) -> Result<Vec<transaction::Model>, ServiceError> {
    let mut query =
        Transaction::find().filter(transaction::Column::FundraiserId.eq(fundraiser_id));
    if let Some(from) = filter.from {
        query = query.filter(transaction::Column::CreatedAt.gte(from));
    }
    if let Some(to) = filter.to {
        query = query.filter(transaction::Column::CreatedAt.lt(to));
    }
    if let Some(settlement) = filter.settlement_status {
        query = query.filter(transaction::Column::SettlementStatus.eq(settlement));
    }
    if let Some(status) = filter.status {
        query = query.filter(transaction::Column::Status.eq(status));
    }
    if let Some(currency) = &filter.currency {
        query = query.filter(transaction::Column::Currency.eq(currency.to_ascii_uppercase()));
    }

    Ok(query
        .order_by_desc(transaction::Column::CreatedAt)
        .all(conn)
        .await?)
}

fn check_subject(fundraiser: &fundraiser::Model, subject: SubjectKind) -> Result<(), ServiceError> {
    let expected = match fundraiser.kind {
        FundraiserKind::Campaign => SubjectKind::Donation,
        FundraiserKind::Event => SubjectKind::Ticket,
    };
    if subject == expected {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "a {} fundraiser accepts {} payments, not {}",
            fundraiser.kind, expected, subject
        )))
    }
}

/// Runs the stale-pending sweep on a fixed interval until the process exits.
pub async fn run_pending_sweep(ledger: LedgerService, max_age: Duration, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = ledger.expire_stale_pending(max_age).await {
            warn!(error = %err, "Stale pending sweep failed");
        }
    }
}
