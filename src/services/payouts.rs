//! Payout aggregation and the payout request/approval state machine.
//!
//! Totals are never maintained incrementally. A live (open or requested)
//! payout is re-aggregated from the ledger every time it is read, and a
//! completed payout freezes the totals it was paid with and claims its
//! transactions through `transactions.payout_id`.

use crate::{
    auth::Actor,
    entities::{
        cashout_request, fundraiser, payout, transaction, CashoutRequest, Fundraiser, Payout,
        PayoutMethod, PayoutStatus, SettlementStatus, Transaction, TransactionStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    rate_limiter::KeyedRateLimit,
    services::{
        keyed_lock::KeyedLocks,
        ledger::{fundraiser_transactions, validate_currency, TransactionFilter},
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn payout_lock_key(fundraiser_id: Uuid, currency: &str) -> String {
    format!("payout:{}:{}", fundraiser_id, currency)
}

fn validate_contact(contact: &str) -> Result<(), ValidationError> {
    if contact.trim().is_empty() || contact.chars().any(char::is_control) {
        return Err(ValidationError::new("contact"));
    }
    Ok(())
}

/// Sums over payable transactions only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PayoutTotals {
    pub transaction_count: i64,
    pub total_gross: i64,
    pub total_fees: i64,
    pub total_net: i64,
}

impl PayoutTotals {
    /// Refunded, failed, pending and unsettled transactions are excluded
    /// entirely, including from the count.
    pub fn aggregate<'a>(txns: impl IntoIterator<Item = &'a transaction::Model>) -> Self {
        txns.into_iter()
            .filter(|t| t.is_payable())
            .fold(Self::default(), |mut acc, t| {
                acc.transaction_count += 1;
                acc.total_gross += t.gross_amount;
                acc.total_fees += t.total_fees();
                acc.total_net += t.net_amount;
                acc
            })
    }

    fn matches(&self, payout: &payout::Model) -> bool {
        self.transaction_count == i64::from(payout.transaction_count)
            && self.total_gross == payout.total_gross
            && self.total_fees == payout.total_fees
            && self.total_net == payout.total_net
    }

    fn count_i32(&self) -> Result<i32, ServiceError> {
        i32::try_from(self.transaction_count)
            .map_err(|_| ServiceError::InternalError("transaction count overflow".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrencySummary {
    pub currency: String,
    /// Payable transactions in the requested range
    pub totals: PayoutTotals,
    /// Payable transactions not yet claimed by a completed payout
    pub outstanding: PayoutTotals,
    pub pending_count: i64,
    pub refunded_count: i64,
    pub failed_count: i64,
}

/// Groups transactions by currency. Amounts in different currencies are never added.
pub fn summarize_by_currency(txns: &[transaction::Model]) -> Vec<CurrencySummary> {
    let mut groups: BTreeMap<&str, Vec<&transaction::Model>> = BTreeMap::new();
    for txn in txns {
        groups.entry(txn.currency.as_str()).or_default().push(txn);
    }

    groups
        .into_iter()
        .map(|(currency, group)| {
            let count = |status: TransactionStatus| {
                group.iter().filter(|t| t.status == status).count() as i64
            };
            CurrencySummary {
                currency: currency.to_string(),
                totals: PayoutTotals::aggregate(group.iter().copied()),
                outstanding: PayoutTotals::aggregate(
                    group.iter().copied().filter(|t| t.payout_id.is_none()),
                ),
                pending_count: count(TransactionStatus::Pending),
                refunded_count: count(TransactionStatus::Refunded),
                failed_count: count(TransactionStatus::Failed),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayoutSummary {
    pub fundraiser_id: Uuid,
    pub fundraiser_name: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub currencies: Vec<CurrencySummary>,
    pub payouts: Vec<payout::Model>,
    pub transactions: Vec<transaction::Model>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePayout {
    #[validate(custom = "validate_currency")]
    pub currency: Option<String>,
}

/// Organizer cash-out request. Targets a payout directly, or the live
/// payout of a fundraiser (created on demand).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CashoutInput {
    pub payout_id: Option<Uuid>,
    pub fundraiser_id: Option<Uuid>,
    #[validate(custom = "validate_currency")]
    pub currency: Option<String>,
    pub method: PayoutMethod,
    /// PayPal email, Venmo handle or bank account reference
    #[validate(length(min = 1, max = 255), custom = "validate_contact")]
    pub contact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePayoutStatus {
    pub status: PayoutStatus,
    pub method: Option<PayoutMethod>,
    #[validate(length(min = 1, max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CashoutReceipt {
    pub payout: payout::Model,
    pub request: cashout_request::Model,
    pub remaining_requests: u32,
}

#[derive(Clone)]
pub struct PayoutService {
    db: Arc<DatabaseConnection>,
    locks: KeyedLocks,
    rate_limiter: Arc<dyn KeyedRateLimit>,
    events: EventSender,
    default_currency: String,
}

impl PayoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        locks: KeyedLocks,
        rate_limiter: Arc<dyn KeyedRateLimit>,
        events: EventSender,
        default_currency: String,
    ) -> Self {
        Self {
            db,
            locks,
            rate_limiter,
            events,
            default_currency,
        }
    }

    /// Totals per currency plus the transaction list for one fundraiser.
    #[instrument(skip(self, actor, filter), fields(actor_id = %actor.id))]
    pub async fn payout_summary(
        &self,
        actor: &Actor,
        fundraiser_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<PayoutSummary, ServiceError> {
        let fundraiser = self.accessible_fundraiser(actor, fundraiser_id).await?;
        let transactions = fundraiser_transactions(&*self.db, fundraiser_id, filter).await?;

        let mut payouts = Vec::new();
        for payout in Payout::find()
            .filter(payout::Column::FundraiserId.eq(fundraiser_id))
            .order_by_desc(payout::Column::CreatedAt)
            .all(&*self.db)
            .await?
        {
            payouts.push(self.refresh_totals(payout).await?);
        }

        Ok(PayoutSummary {
            fundraiser_id,
            fundraiser_name: fundraiser.name,
            from: filter.from,
            to: filter.to,
            currencies: summarize_by_currency(&transactions),
            payouts,
            transactions,
        })
    }

    /// Returns the live payout for `(fundraiser, currency)`, creating an open
    /// one if none exists. The flag is true when a payout was created.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id))]
    pub async fn create_payout(
        &self,
        actor: &Actor,
        fundraiser_id: Uuid,
        input: CreatePayout,
    ) -> Result<(payout::Model, bool), ServiceError> {
        input.validate()?;
        self.accessible_fundraiser(actor, fundraiser_id).await?;
        let currency = self.currency_or_default(input.currency.as_deref());
        self.live_payout(fundraiser_id, &currency).await
    }

    pub async fn get_payout(&self, actor: &Actor, id: Uuid) -> Result<payout::Model, ServiceError> {
        let (payout, _) = self.accessible_payout(actor, id).await?;
        self.refresh_totals(payout).await
    }

    /// Records a cash-out request from the fundraiser's owner and moves the
    /// payout to `requested`. Repeating the request updates the destination;
    /// every attempt appends an audit row.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, method = %input.method))]
    pub async fn request_cashout(
        &self,
        actor: &Actor,
        input: CashoutInput,
    ) -> Result<CashoutReceipt, ServiceError> {
        let client_key = actor.client_key();
        let limit = self.rate_limiter.check_rate_limit(&client_key).await;
        if !limit.allowed {
            warn!(
                actor_id = %actor.id,
                reset_secs = limit.reset_time.as_secs(),
                "Cash-out request throttled"
            );
            return Err(ServiceError::RateLimitExceeded);
        }

        input.validate()?;
        if input.method == PayoutMethod::Paypal && !input.contact.contains('@') {
            return Err(ServiceError::ValidationError(
                "paypal payouts require an email contact".to_string(),
            ));
        }

        let payout = match (input.payout_id, input.fundraiser_id) {
            (Some(payout_id), None) => Payout::find_by_id(payout_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", payout_id)))?,
            (None, Some(fundraiser_id)) => {
                let fundraiser = self.fundraiser(fundraiser_id).await?;
                self.require_owner(actor, &fundraiser)?;
                let currency = self.currency_or_default(input.currency.as_deref());
                self.live_payout(fundraiser_id, &currency).await?.0
            }
            _ => {
                return Err(ServiceError::ValidationError(
                    "exactly one of payout_id or fundraiser_id is required".to_string(),
                ))
            }
        };

        let fundraiser = self.fundraiser(payout.fundraiser_id).await?;
        self.require_owner(actor, &fundraiser)?;

        let _guard = self
            .locks
            .acquire(&payout_lock_key(payout.fundraiser_id, &payout.currency))
            .await;

        // Re-read under the lock; an operator may have closed it meanwhile.
        let payout = Payout::find_by_id(payout.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", payout.id)))?;
        if !payout.status.can_transition_to(PayoutStatus::Requested) {
            return Err(ServiceError::InvalidStatus(format!(
                "payout {} is {} and cannot be cashed out",
                payout.id, payout.status
            )));
        }

        let txn = self.db.begin().await?;
        let totals = PayoutTotals::aggregate(
            &outstanding_transactions(&txn, payout.fundraiser_id, &payout.currency).await?,
        );
        if totals.total_net <= 0 {
            txn.rollback().await?;
            return Err(ServiceError::ValidationError(
                "no settled proceeds available to cash out".to_string(),
            ));
        }

        let now = Utc::now();
        let result = Payout::update_many()
            .col_expr(payout::Column::Status, Expr::value(PayoutStatus::Requested))
            .col_expr(payout::Column::PayoutMethod, Expr::value(input.method))
            .col_expr(
                payout::Column::PayoutReference,
                Expr::value(input.contact.trim().to_string()),
            )
            .col_expr(payout::Column::RequestedBy, Expr::value(actor.id))
            .col_expr(payout::Column::RequestedAt, Expr::value(now))
            .col_expr(payout::Column::TotalGross, Expr::value(totals.total_gross))
            .col_expr(payout::Column::TotalFees, Expr::value(totals.total_fees))
            .col_expr(payout::Column::TotalNet, Expr::value(totals.total_net))
            .col_expr(payout::Column::TransactionCount, Expr::value(totals.count_i32()?))
            .col_expr(payout::Column::UpdatedAt, Expr::value(now))
            .filter(payout::Column::Id.eq(payout.id))
            .filter(payout::Column::Status.eq(payout.status))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Err(ServiceError::Conflict(format!(
                "payout {} changed concurrently",
                payout.id
            )));
        }

        let request = cashout_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            payout_id: Set(payout.id),
            fundraiser_id: Set(payout.fundraiser_id),
            requested_by: Set(actor.id),
            method: Set(input.method),
            contact: Set(input.contact.trim().to_string()),
            client_key: Set(client_key),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let updated = Payout::find_by_id(payout.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", payout.id)))?;
        txn.commit().await?;

        info!(
            fundraiser_id = %updated.fundraiser_id,
            payout_id = %updated.id,
            method = %input.method,
            requested_by = %actor.id,
            previous_status = %payout.status,
            total_net = updated.total_net,
            currency = %updated.currency,
            "Cash-out requested"
        );
        self.events.publish(Event::PayoutRequested {
            payout_id: updated.id,
            fundraiser_id: updated.fundraiser_id,
            requested_by: actor.id,
            method: input.method,
        });

        Ok(CashoutReceipt {
            payout: updated,
            request,
            remaining_requests: limit.remaining,
        })
    }

    /// Operator-only completion or failure of a payout.
    ///
    /// Completion re-aggregates the outstanding transactions, freezes those
    /// totals on the payout and stamps `payout_id` on each included
    /// transaction, all in one database transaction.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id, status = %input.status))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        payout_id: Uuid,
        input: UpdatePayoutStatus,
    ) -> Result<payout::Model, ServiceError> {
        actor.require_operator()?;
        input.validate()?;
        if !input.status.is_terminal() {
            return Err(ServiceError::ValidationError(format!(
                "operators may only set completed or failed, not {}",
                input.status
            )));
        }

        let existing = Payout::find_by_id(payout_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", payout_id)))?;
        let _guard = self
            .locks
            .acquire(&payout_lock_key(existing.fundraiser_id, &existing.currency))
            .await;

        let txn = self.db.begin().await?;
        let current = Payout::find_by_id(payout_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", payout_id)))?;
        if !current.status.can_transition_to(input.status) {
            txn.rollback().await?;
            return Err(ServiceError::InvalidStatus(format!(
                "payout {} cannot move from {} to {}",
                payout_id, current.status, input.status
            )));
        }

        let now = Utc::now();
        let mut active: payout::ActiveModel = current.clone().into();
        active.status = Set(input.status);
        active.updated_at = Set(now);
        if input.notes.is_some() {
            active.notes = Set(input.notes.clone());
        }

        let mut claimed = 0u64;
        if input.status == PayoutStatus::Completed {
            let method = input.method.or(current.payout_method).ok_or_else(|| {
                ServiceError::ValidationError("payout method is required to complete".to_string())
            })?;
            let reference = input
                .reference
                .clone()
                .or_else(|| current.payout_reference.clone())
                .ok_or_else(|| {
                    ServiceError::ValidationError(
                        "payout reference is required to complete".to_string(),
                    )
                })?;

            let included =
                outstanding_transactions(&txn, current.fundraiser_id, &current.currency).await?;
            let totals = PayoutTotals::aggregate(&included);
            let ids: Vec<Uuid> = included.iter().map(|t| t.id).collect();

            if !ids.is_empty() {
                let result = Transaction::update_many()
                    .col_expr(transaction::Column::PayoutId, Expr::value(Some(payout_id)))
                    .col_expr(transaction::Column::UpdatedAt, Expr::value(now))
                    .filter(transaction::Column::Id.is_in(ids.clone()))
                    .filter(transaction::Column::PayoutId.is_null())
                    .exec(&txn)
                    .await?;
                if result.rows_affected != ids.len() as u64 {
                    txn.rollback().await?;
                    return Err(ServiceError::Conflict(format!(
                        "transactions for payout {} were claimed concurrently",
                        payout_id
                    )));
                }
                claimed = result.rows_affected;
            }

            active.payout_method = Set(Some(method));
            active.payout_reference = Set(Some(reference));
            active.total_gross = Set(totals.total_gross);
            active.total_fees = Set(totals.total_fees);
            active.total_net = Set(totals.total_net);
            active.transaction_count = Set(totals.count_i32()?);
            active.payout_date = Set(Some(now));
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            fundraiser_id = %updated.fundraiser_id,
            payout_id = %updated.id,
            from = %current.status,
            to = %updated.status,
            method = ?updated.payout_method,
            reference = ?updated.payout_reference,
            requested_by = ?updated.requested_by,
            operator_id = %actor.id,
            total_net = updated.total_net,
            claimed_transactions = claimed,
            "Payout status updated by operator"
        );

        match updated.status {
            PayoutStatus::Completed => self.events.publish(Event::PayoutCompleted {
                payout_id: updated.id,
                fundraiser_id: updated.fundraiser_id,
                total_net: updated.total_net,
                currency: updated.currency.clone(),
                payout_date: now,
            }),
            PayoutStatus::Failed => self.events.publish(Event::PayoutFailed {
                payout_id: updated.id,
                fundraiser_id: updated.fundraiser_id,
                notes: updated.notes.clone(),
            }),
            _ => {}
        }

        Ok(updated)
    }

    /// Audit trail of cash-out attempts, oldest first.
    pub async fn list_cashout_requests(
        &self,
        actor: &Actor,
        payout_id: Uuid,
    ) -> Result<Vec<cashout_request::Model>, ServiceError> {
        self.accessible_payout(actor, payout_id).await?;
        Ok(CashoutRequest::find()
            .filter(cashout_request::Column::PayoutId.eq(payout_id))
            .order_by_asc(cashout_request::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn live_payout(
        &self,
        fundraiser_id: Uuid,
        currency: &str,
    ) -> Result<(payout::Model, bool), ServiceError> {
        let _guard = self
            .locks
            .acquire(&payout_lock_key(fundraiser_id, currency))
            .await;

        let existing = Payout::find()
            .filter(payout::Column::FundraiserId.eq(fundraiser_id))
            .filter(payout::Column::Currency.eq(currency))
            .filter(payout::Column::Status.is_in([PayoutStatus::Open, PayoutStatus::Requested]))
            .order_by_desc(payout::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        if let Some(existing) = existing {
            return Ok((self.refresh_totals(existing).await?, false));
        }

        let totals = PayoutTotals::aggregate(
            &outstanding_transactions(&*self.db, fundraiser_id, currency).await?,
        );
        let now = Utc::now();
        let created = payout::ActiveModel {
            id: Set(Uuid::new_v4()),
            fundraiser_id: Set(fundraiser_id),
            currency: Set(currency.to_string()),
            total_gross: Set(totals.total_gross),
            total_fees: Set(totals.total_fees),
            total_net: Set(totals.total_net),
            transaction_count: Set(totals.count_i32()?),
            status: Set(PayoutStatus::Open),
            payout_method: Set(None),
            payout_reference: Set(None),
            notes: Set(None),
            requested_by: Set(None),
            requested_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            payout_date: Set(None),
        }
        .insert(&*self.db)
        .await?;

        info!(
            fundraiser_id = %fundraiser_id,
            payout_id = %created.id,
            currency = %currency,
            total_net = created.total_net,
            "Payout opened"
        );
        Ok((created, true))
    }

    /// Recomputes a live payout's totals from the ledger. Terminal payouts
    /// keep the totals they were closed with, including when `payout` is a
    /// snapshot taken before a concurrent completion.
    pub async fn refresh_totals(&self, payout: payout::Model) -> Result<payout::Model, ServiceError> {
        if !payout.status.is_live() {
            return Ok(payout);
        }
        let totals = PayoutTotals::aggregate(
            &outstanding_transactions(&*self.db, payout.fundraiser_id, &payout.currency).await?,
        );
        if totals.matches(&payout) {
            return Ok(payout);
        }

        let result = Payout::update_many()
            .col_expr(payout::Column::TotalGross, Expr::value(totals.total_gross))
            .col_expr(payout::Column::TotalFees, Expr::value(totals.total_fees))
            .col_expr(payout::Column::TotalNet, Expr::value(totals.total_net))
            .col_expr(
                payout::Column::TransactionCount,
                Expr::value(totals.count_i32()?),
            )
            .col_expr(payout::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payout::Column::Id.eq(payout.id))
            .filter(payout::Column::Status.is_in([PayoutStatus::Open, PayoutStatus::Requested]))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            debug!(payout_id = %payout.id, "Payout closed before its totals were refreshed");
        }

        Payout::find_by_id(payout.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", payout.id)))
    }

    fn currency_or_default(&self, currency: Option<&str>) -> String {
        currency
            .unwrap_or(&self.default_currency)
            .to_ascii_uppercase()
    }

    async fn fundraiser(&self, id: Uuid) -> Result<fundraiser::Model, ServiceError> {
        Fundraiser::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Fundraiser {} not found", id)))
    }

    async fn accessible_fundraiser(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<fundraiser::Model, ServiceError> {
        let fundraiser = self.fundraiser(id).await?;
        if actor.can_access(fundraiser.owner_id) {
            Ok(fundraiser)
        } else {
            warn!(actor_id = %actor.id, fundraiser_id = %id, "Fundraiser access denied");
            Err(ServiceError::Forbidden(
                "not allowed to view this fundraiser".to_string(),
            ))
        }
    }

    async fn accessible_payout(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<(payout::Model, fundraiser::Model), ServiceError> {
        let (payout, fundraiser) = Payout::find_by_id(id)
            .find_also_related(Fundraiser)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payout {} not found", id)))?;
        let fundraiser = fundraiser.ok_or_else(|| {
            ServiceError::InternalError(format!("payout {} has no fundraiser", id))
        })?;
        if !actor.can_access(fundraiser.owner_id) {
            warn!(actor_id = %actor.id, payout_id = %id, "Payout access denied");
            return Err(ServiceError::Forbidden(
                "not allowed to view this payout".to_string(),
            ));
        }
        Ok((payout, fundraiser))
    }

    fn require_owner(&self, actor: &Actor, fundraiser: &fundraiser::Model) -> Result<(), ServiceError> {
        if fundraiser.is_owned_by(actor.id) {
            return Ok(());
        }
        warn!(
            actor_id = %actor.id,
            fundraiser_id = %fundraiser.id,
            owner_id = %fundraiser.owner_id,
            "Cash-out rejected for non-owner"
        );
        Err(ServiceError::Forbidden(
            "only the fundraiser owner may request a cash-out".to_string(),
        ))
    }
}

/// Payable transactions of `(fundraiser, currency)` not yet claimed by a payout.
async fn outstanding_transactions<C: ConnectionTrait>(
    conn: &C,
    fundraiser_id: Uuid,
    currency: &str,
) -> Result<Vec<transaction::Model>, ServiceError> {
    Ok(Transaction::find()
        .filter(transaction::Column::FundraiserId.eq(fundraiser_id))
        .filter(transaction::Column::Currency.eq(currency))
        .filter(transaction::Column::Status.eq(TransactionStatus::Succeeded))
        .filter(transaction::Column::SettlementStatus.eq(SettlementStatus::Settled))
        .filter(transaction::Column::PayoutId.is_null())
        .all(conn)
        .await?)
}
