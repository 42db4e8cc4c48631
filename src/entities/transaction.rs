use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Processor {
    #[sea_orm(string_value = "stripe")]
    Stripe,
    #[sea_orm(string_value = "paypal")]
    Paypal,
    #[sea_orm(string_value = "card_gateway")]
    CardGateway,
}

/// Campaign donation or event ticket.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubjectKind {
    #[sea_orm(string_value = "donation")]
    Donation,
    #[sea_orm(string_value = "ticket")]
    Ticket,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl TransactionStatus {
    /// The complete transition table. Everything not listed is illegal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Succeeded)
                | (Self::Pending, Self::Failed)
                | (Self::Succeeded, Self::Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }
}

/// Whether the net funds have cleared into the settlement account.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettlementStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "settled")]
    Settled,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl SettlementStatus {
    /// Late-arriving funds may still settle a previously failed settlement.
    pub fn can_transition_to(self, next: SettlementStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Settled)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Settled)
        )
    }
}

/// One payment attempt. Amounts are integer minor units of `currency`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "transactions")]
#[schema(as = Transaction)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub processor: Processor,
    pub processor_reference: String,
    pub fundraiser_id: Uuid,
    pub subject_kind: SubjectKind,
    pub gross_amount: i64,
    pub currency: String,
    pub platform_fee_amount: i64,
    pub processor_fee_amount: i64,
    pub net_amount: i64,
    pub status: TransactionStatus,
    pub settlement_status: SettlementStatus,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    /// Set once the funds have been paid out.
    pub payout_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fundraiser::Entity",
        from = "Column::FundraiserId",
        to = "super::fundraiser::Column::Id"
    )]
    Fundraiser,
}

impl Related<super::fundraiser::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fundraiser.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn total_fees(&self) -> i64 {
        self.platform_fee_amount + self.processor_fee_amount
    }

    /// Counted towards payouts: captured, cleared and not refunded.
    pub fn is_payable(&self) -> bool {
        self.status == TransactionStatus::Succeeded
            && self.settlement_status == SettlementStatus::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(TransactionStatus::Pending, TransactionStatus::Succeeded, true)]
    #[case(TransactionStatus::Pending, TransactionStatus::Failed, true)]
    #[case(TransactionStatus::Succeeded, TransactionStatus::Refunded, true)]
    #[case(TransactionStatus::Pending, TransactionStatus::Refunded, false)]
    #[case(TransactionStatus::Succeeded, TransactionStatus::Succeeded, false)]
    #[case(TransactionStatus::Succeeded, TransactionStatus::Failed, false)]
    #[case(TransactionStatus::Refunded, TransactionStatus::Succeeded, false)]
    #[case(TransactionStatus::Failed, TransactionStatus::Succeeded, false)]
    #[case(TransactionStatus::Failed, TransactionStatus::Pending, false)]
    #[case(TransactionStatus::Refunded, TransactionStatus::Pending, false)]
    fn transaction_transition_table(
        #[case] from: TransactionStatus,
        #[case] to: TransactionStatus,
        #[case] legal: bool,
    ) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[rstest]
    #[case(SettlementStatus::Pending, SettlementStatus::Settled, true)]
    #[case(SettlementStatus::Pending, SettlementStatus::Failed, true)]
    #[case(SettlementStatus::Failed, SettlementStatus::Settled, true)]
    #[case(SettlementStatus::Settled, SettlementStatus::Failed, false)]
    #[case(SettlementStatus::Settled, SettlementStatus::Pending, false)]
    fn settlement_transition_table(
        #[case] from: SettlementStatus,
        #[case] to: SettlementStatus,
        #[case] legal: bool,
    ) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn processor_names_round_trip_through_strings() {
        assert_eq!(Processor::CardGateway.to_string(), "card_gateway");
        assert_eq!(Processor::from_str("paypal").unwrap(), Processor::Paypal);
        assert!(Processor::from_str("venmo").is_err());
    }
}
