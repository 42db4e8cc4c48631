use crate::{
    entities::{transaction, Processor, SettlementStatus, Transaction, TransactionStatus},
    errors::ServiceError,
    services::{keyed_lock::KeyedLocks, ledger::ledger_lock_key},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Settlement state a processor statement can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Settled,
    Failed,
}

impl From<StatementStatus> for SettlementStatus {
    fn from(status: StatementStatus) -> Self {
        match status {
            StatementStatus::Settled => SettlementStatus::Settled,
            StatementStatus::Failed => SettlementStatus::Failed,
        }
    }
}

/// One line of a processor settlement statement.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StatementEntry {
    #[validate(length(min = 1, max = 255))]
    pub processor_reference: String,
    pub status: StatementStatus,
    /// Net amount the processor says it paid, in minor units
    #[validate(range(min = 0))]
    pub net_amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SettlementStatement {
    #[validate]
    pub entries: Vec<StatementEntry>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SettlementReport {
    pub processor: Option<Processor>,
    pub total_entries: usize,
    pub matched: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub unmatched: usize,
    pub discrepancies: usize,
    /// Sum of |statement net - ledger net| over discrepant entries
    pub discrepancy_amount: i64,
    pub unmatched_references: Vec<String>,
}

#[derive(Clone)]
pub struct SettlementService {
    db: Arc<DatabaseConnection>,
    locks: KeyedLocks,
}

impl SettlementService {
    pub fn new(db: Arc<DatabaseConnection>, locks: KeyedLocks) -> Self {
        Self { db, locks }
    }

    /// Applies a processor settlement statement to the ledger.
    ///
    /// Only captured (succeeded or later refunded) transactions can settle.
    /// Entries that refer to unknown or uncaptured transactions are counted
    /// as unmatched. A net amount that differs from the ledger is reported as
    /// a discrepancy but the settlement status is still recorded.
    #[instrument(skip(self, statement), fields(processor = %processor, entries = statement.entries.len()))]
    pub async fn reconcile_settlements(
        &self,
        processor: Processor,
        statement: SettlementStatement,
    ) -> Result<SettlementReport, ServiceError> {
        statement.validate()?;

        let mut report = SettlementReport {
            processor: Some(processor),
            total_entries: statement.entries.len(),
            ..Default::default()
        };

        for entry in statement.entries {
            let _guard = self
                .locks
                .acquire(&ledger_lock_key(processor, &entry.processor_reference))
                .await;

            let found = Transaction::find()
                .filter(transaction::Column::Processor.eq(processor))
                .filter(
                    transaction::Column::ProcessorReference.eq(entry.processor_reference.as_str()),
                )
                .one(&*self.db)
                .await?;

            let Some(txn) = found.filter(|t| {
                matches!(
                    t.status,
                    TransactionStatus::Succeeded | TransactionStatus::Refunded
                )
            }) else {
                report.unmatched += 1;
                report.unmatched_references.push(entry.processor_reference);
                continue;
            };
            report.matched += 1;

            if let Some(statement_net) = entry.net_amount {
                if statement_net != txn.net_amount {
                    report.discrepancies += 1;
                    report.discrepancy_amount = report
                        .discrepancy_amount
                        .saturating_add(net_difference(statement_net, txn.net_amount));
                    warn!(
                        transaction_id = %txn.id,
                        reference = %txn.processor_reference,
                        ledger_net = txn.net_amount,
                        statement_net,
                        "Settlement amount does not match the ledger"
                    );
                }
            }

            let target: SettlementStatus = entry.status.into();
            if !txn.settlement_status.can_transition_to(target) {
                report.unchanged += 1;
                continue;
            }

            let result = Transaction::update_many()
                .col_expr(transaction::Column::SettlementStatus, Expr::value(target))
                .col_expr(transaction::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transaction::Column::Id.eq(txn.id))
                .filter(transaction::Column::SettlementStatus.eq(txn.settlement_status))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 1 {
                report.updated += 1;
            } else {
                report.unchanged += 1;
            }
        }

        info!(
            processor = %processor,
            matched = report.matched,
            updated = report.updated,
            unmatched = report.unmatched,
            discrepancies = report.discrepancies,
            discrepancy_amount = report.discrepancy_amount,
            "Settlement statement reconciled"
        );
        Ok(report)
    }
}

/// Absolute gap between two amounts, clamped to `i64::MAX`.
fn net_difference(statement_net: i64, ledger_net: i64) -> i64 {
    i64::try_from(statement_net.abs_diff(ledger_net)).unwrap_or(i64::MAX)
}
