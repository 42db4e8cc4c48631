//! Tabular exports of ledger and signup data.
//!
//! Output is CSV with RFC 4180 quoting. Every personally identifying column
//! goes through [`PrivacyMode`]; full values are only produced for the
//! fundraiser's owner or an operator. An export with no records is the
//! literal [`NO_DATA`] so consumers can tell it apart from a broken file.

use crate::{
    auth::Actor,
    entities::{
        fundraiser, transaction, volunteer_signup, Fundraiser, FundraiserKind, SubjectKind,
        VolunteerSignup,
    },
    errors::ServiceError,
    money::format_minor_units,
    services::{
        ledger::{fundraiser_transactions, TransactionFilter},
        payouts::summarize_by_currency,
        redaction::PrivacyMode,
    },
};
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const NO_DATA: &str = "No data available";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportKind {
    Donations,
    Registrations,
    Volunteers,
    CampaignSummary,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ExportRequest {
    /// Required for every kind except `campaign_summary`
    pub fundraiser_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_personal_data: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExportOutput {
    pub kind: ExportKind,
    pub privacy: PrivacyMode,
    /// Personal data was requested but the caller may not see it
    pub downgraded: bool,
    pub row_count: usize,
    pub content: String,
}

/// Quotes a field when it contains a comma, quote or line break.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct CsvTable {
    headers: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new(headers: &'static [&'static str]) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.headers.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return NO_DATA.to_string();
        }
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(
            self.headers
                .iter()
                .map(|h| escape_field(h))
                .collect::<Vec<_>>()
                .join(","),
        );
        for row in &self.rows {
            lines.push(
                row.iter()
                    .map(|field| escape_field(field))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        let mut body = lines.join("\n");
        body.push('\n');
        body
    }
}

const PAYMENT_HEADERS: &[&str] = &[
    "transaction_id",
    "created_at",
    "processor",
    "processor_reference",
    "status",
    "settlement_status",
    "currency",
    "gross_amount",
    "platform_fee",
    "processor_fee",
    "net_amount",
    "payer_name",
    "payer_email",
];

const VOLUNTEER_HEADERS: &[&str] = &["name", "email", "phone", "role", "shift", "signed_up_at"];

const SUMMARY_HEADERS: &[&str] = &[
    "campaign_id",
    "campaign_name",
    "currency",
    "donation_count",
    "gross_amount",
    "total_fees",
    "net_amount",
    "refunded_count",
    "failed_count",
];

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn payment_rows(txns: &[transaction::Model], privacy: PrivacyMode) -> CsvTable {
    let mut table = CsvTable::new(PAYMENT_HEADERS);
    for t in txns {
        table.push(vec![
            t.id.to_string(),
            timestamp(t.created_at),
            t.processor.to_string(),
            t.processor_reference.clone(),
            t.status.to_string(),
            t.settlement_status.to_string(),
            t.currency.clone(),
            format_minor_units(t.gross_amount, &t.currency),
            format_minor_units(t.platform_fee_amount, &t.currency),
            format_minor_units(t.processor_fee_amount, &t.currency),
            format_minor_units(t.net_amount, &t.currency),
            privacy.name(t.payer_name.as_deref()),
            privacy.email(t.payer_email.as_deref()),
        ]);
    }
    table
}

pub fn volunteer_rows(signups: &[volunteer_signup::Model], privacy: PrivacyMode) -> CsvTable {
    let mut table = CsvTable::new(VOLUNTEER_HEADERS);
    for s in signups {
        table.push(vec![
            privacy.name(Some(&s.name)),
            privacy.email(Some(&s.email)),
            privacy.phone(s.phone.as_deref()),
            s.role.clone().unwrap_or_default(),
            s.shift.clone().unwrap_or_default(),
            timestamp(s.created_at),
        ]);
    }
    table
}

#[derive(Clone)]
pub struct ExportService {
    db: Arc<DatabaseConnection>,
}

impl ExportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id, kind = %kind))]
    pub async fn export(
        &self,
        actor: &Actor,
        kind: ExportKind,
        request: &ExportRequest,
    ) -> Result<ExportOutput, ServiceError> {
        if let (Some(from), Some(to)) = (request.from, request.to) {
            if from >= to {
                return Err(ServiceError::ValidationError(
                    "`from` must be before `to`".to_string(),
                ));
            }
        }

        let (table, privacy, downgraded) = match kind {
            ExportKind::Donations | ExportKind::Registrations => {
                let fundraiser = self.required_fundraiser(request).await?;
                let (privacy, downgraded) = resolve_privacy(actor, &fundraiser, request);
                let subject = if kind == ExportKind::Donations {
                    SubjectKind::Donation
                } else {
                    SubjectKind::Ticket
                };
                let txns: Vec<_> = fundraiser_transactions(
                    &*self.db,
                    fundraiser.id,
                    &TransactionFilter {
                        from: request.from,
                        to: request.to,
                        ..Default::default()
                    },
                )
                .await?
                .into_iter()
                .filter(|t| t.subject_kind == subject)
                .collect();
                (payment_rows(&txns, privacy), privacy, downgraded)
            }
            ExportKind::Volunteers => {
                let fundraiser = self.required_fundraiser(request).await?;
                let (privacy, downgraded) = resolve_privacy(actor, &fundraiser, request);
                let mut query = VolunteerSignup::find()
                    .filter(volunteer_signup::Column::FundraiserId.eq(fundraiser.id));
                if let Some(from) = request.from {
                    query = query.filter(volunteer_signup::Column::CreatedAt.gte(from));
                }
                if let Some(to) = request.to {
                    query = query.filter(volunteer_signup::Column::CreatedAt.lt(to));
                }
                let signups = query
                    .order_by_asc(volunteer_signup::Column::CreatedAt)
                    .all(&*self.db)
                    .await?;
                (volunteer_rows(&signups, privacy), privacy, downgraded)
            }
            ExportKind::CampaignSummary => (
                self.campaign_summary(actor, request).await?,
                PrivacyMode::Redacted,
                false,
            ),
        };

        info!(
            actor_id = %actor.id,
            kind = %kind,
            privacy = %privacy,
            rows = table.len(),
            "Export generated"
        );
        Ok(ExportOutput {
            kind,
            privacy,
            downgraded,
            row_count: table.len(),
            content: table.render(),
        })
    }

    /// Campaigns in scope: the requested one, every campaign for operators,
    /// or the caller's own campaigns.
    async fn campaign_summary(
        &self,
        actor: &Actor,
        request: &ExportRequest,
    ) -> Result<CsvTable, ServiceError> {
        let mut query =
            Fundraiser::find().filter(fundraiser::Column::Kind.eq(FundraiserKind::Campaign));
        if let Some(id) = request.fundraiser_id {
            query = query.filter(fundraiser::Column::Id.eq(id));
        } else if !actor.is_operator() {
            query = query.filter(fundraiser::Column::OwnerId.eq(actor.id));
        }
        let campaigns = query
            .order_by_asc(fundraiser::Column::Name)
            .all(&*self.db)
            .await?;

        let filter = TransactionFilter {
            from: request.from,
            to: request.to,
            ..Default::default()
        };
        let mut table = CsvTable::new(SUMMARY_HEADERS);
        for campaign in campaigns {
            let txns = fundraiser_transactions(&*self.db, campaign.id, &filter).await?;
            for summary in summarize_by_currency(&txns) {
                let currency = summary.currency.as_str();
                table.push(vec![
                    campaign.id.to_string(),
                    campaign.name.clone(),
                    summary.currency.clone(),
                    summary.totals.transaction_count.to_string(),
                    format_minor_units(summary.totals.total_gross, currency),
                    format_minor_units(summary.totals.total_fees, currency),
                    format_minor_units(summary.totals.total_net, currency),
                    summary.refunded_count.to_string(),
                    summary.failed_count.to_string(),
                ]);
            }
        }
        Ok(table)
    }

    async fn required_fundraiser(
        &self,
        request: &ExportRequest,
    ) -> Result<fundraiser::Model, ServiceError> {
        let id = request.fundraiser_id.ok_or_else(|| {
            ServiceError::ValidationError("fundraiser_id is required for this export".to_string())
        })?;
        Fundraiser::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Fundraiser {} not found", id)))
    }
}

/// Full data only for the owner or an operator who asked for it.
fn resolve_privacy(
    actor: &Actor,
    fundraiser: &fundraiser::Model,
    request: &ExportRequest,
) -> (PrivacyMode, bool) {
    if !request.include_personal_data {
        return (PrivacyMode::Redacted, false);
    }
    if actor.can_access(fundraiser.owner_id) {
        return (PrivacyMode::Full, false);
    }
    warn!(
        actor_id = %actor.id,
        fundraiser_id = %fundraiser.id,
        "Personal data requested by non-owner; serving redacted export"
    );
    (PrivacyMode::Redacted, true)
}
