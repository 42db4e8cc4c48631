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
pub enum PayoutStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "requested")]
    Requested,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl PayoutStatus {
    /// `requested -> requested` is legal: a repeated cash-out request only
    /// updates the destination.
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Requested)
                | (Self::Requested, Self::Requested)
                | (Self::Open, Self::Completed)
                | (Self::Requested, Self::Completed)
                | (Self::Open, Self::Failed)
                | (Self::Requested, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Totals of non-terminal payouts are recomputed on every read.
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
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
pub enum PayoutMethod {
    #[sea_orm(string_value = "paypal")]
    Paypal,
    #[sea_orm(string_value = "venmo")]
    Venmo,
    #[sea_orm(string_value = "ach")]
    Ach,
}

/// Net proceeds of one fundraiser in one currency.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "payouts")]
#[schema(as = Payout)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub fundraiser_id: Uuid,
    pub currency: String,
    pub total_gross: i64,
    pub total_fees: i64,
    pub total_net: i64,
    pub transaction_count: i32,
    pub status: PayoutStatus,
    pub payout_method: Option<PayoutMethod>,
    pub payout_reference: Option<String>,
    pub notes: Option<String>,
    pub requested_by: Option<Uuid>,
    pub requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payout_date: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fundraiser::Entity",
        from = "Column::FundraiserId",
        to = "super::fundraiser::Column::Id"
    )]
    Fundraiser,
    #[sea_orm(has_many = "super::cashout_request::Entity")]
    CashoutRequests,
}

impl Related<super::fundraiser::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fundraiser.def()
    }
}

impl Related<super::cashout_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CashoutRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
