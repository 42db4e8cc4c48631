use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_fundraisers_table::Migration),
            Box::new(m20240601_000002_create_transactions_table::Migration),
            Box::new(m20240601_000003_create_webhook_events_table::Migration),
            Box::new(m20240601_000004_create_payout_tables::Migration),
            Box::new(m20240601_000005_create_volunteer_signups_table::Migration),
        ]
    }
}

mod m20240601_000001_create_fundraisers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_fundraisers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Fundraisers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Fundraisers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Fundraisers::Kind).string_len(16).not_null())
                        .col(ColumnDef::new(Fundraisers::Name).string().not_null())
                        .col(ColumnDef::new(Fundraisers::OwnerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Fundraisers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_fundraisers_owner_id")
                        .table(Fundraisers::Table)
                        .col(Fundraisers::OwnerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Fundraisers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Fundraisers {
        Table,
        Id,
        Kind,
        Name,
        OwnerId,
        CreatedAt,
    }
}

mod m20240601_000002_create_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Transactions::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Transactions::Processor).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Transactions::ProcessorReference)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::FundraiserId).uuid().not_null())
                        .col(ColumnDef::new(Transactions::SubjectKind).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Transactions::GrossAmount)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::Currency).string_len(3).not_null())
                        .col(
                            ColumnDef::new(Transactions::PlatformFeeAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Transactions::ProcessorFeeAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Transactions::NetAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Transactions::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Transactions::SettlementStatus)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::PayerName).string().null())
                        .col(ColumnDef::new(Transactions::PayerEmail).string().null())
                        .col(ColumnDef::new(Transactions::PayoutId).uuid().null())
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transactions_fundraiser_id")
                                .from(Transactions::Table, Transactions::FundraiserId)
                                .to(Fundraisers::Table, Fundraisers::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One ledger row per processor reference
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_transactions_processor_reference")
                        .table(Transactions::Table)
                        .col(Transactions::Processor)
                        .col(Transactions::ProcessorReference)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_fundraiser_status")
                        .table(Transactions::Table)
                        .col(Transactions::FundraiserId)
                        .col(Transactions::Status)
                        .col(Transactions::SettlementStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_status_created_at")
                        .table(Transactions::Table)
                        .col(Transactions::Status)
                        .col(Transactions::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_payout_id")
                        .table(Transactions::Table)
                        .col(Transactions::PayoutId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transactions {
        Table,
        Id,
        Processor,
        ProcessorReference,
        FundraiserId,
        SubjectKind,
        GrossAmount,
        Currency,
        PlatformFeeAmount,
        ProcessorFeeAmount,
        NetAmount,
        Status,
        SettlementStatus,
        PayerName,
        PayerEmail,
        PayoutId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Fundraisers {
        Table,
        Id,
    }
}

mod m20240601_000003_create_webhook_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_webhook_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WebhookEvents::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(WebhookEvents::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(WebhookEvents::Processor).string_len(32).not_null())
                        .col(ColumnDef::new(WebhookEvents::EventId).string().not_null())
                        .col(ColumnDef::new(WebhookEvents::EventKind).string_len(32).not_null())
                        .col(
                            ColumnDef::new(WebhookEvents::ProcessorReference)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WebhookEvents::TransactionId).uuid().null())
                        .col(ColumnDef::new(WebhookEvents::Outcome).string_len(64).not_null())
                        .col(
                            ColumnDef::new(WebhookEvents::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The idempotency key for webhook deliveries
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_webhook_events_processor_event_id")
                        .table(WebhookEvents::Table)
                        .col(WebhookEvents::Processor)
                        .col(WebhookEvents::EventId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WebhookEvents {
        Table,
        Id,
        Processor,
        EventId,
        EventKind,
        ProcessorReference,
        TransactionId,
        Outcome,
        ReceivedAt,
    }
}

mod m20240601_000004_create_payout_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_payout_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payouts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payouts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payouts::FundraiserId).uuid().not_null())
                        .col(ColumnDef::new(Payouts::Currency).string_len(3).not_null())
                        .col(
                            ColumnDef::new(Payouts::TotalGross)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Payouts::TotalFees)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Payouts::TotalNet)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Payouts::TransactionCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Payouts::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Payouts::PayoutMethod).string_len(16).null())
                        .col(ColumnDef::new(Payouts::PayoutReference).string().null())
                        .col(ColumnDef::new(Payouts::Notes).text().null())
                        .col(ColumnDef::new(Payouts::RequestedBy).uuid().null())
                        .col(
                            ColumnDef::new(Payouts::RequestedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payouts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payouts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payouts::PayoutDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payouts_fundraiser_id")
                                .from(Payouts::Table, Payouts::FundraiserId)
                                .to(Fundraisers::Table, Fundraisers::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payouts_fundraiser_currency_status")
                        .table(Payouts::Table)
                        .col(Payouts::FundraiserId)
                        .col(Payouts::Currency)
                        .col(Payouts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CashoutRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CashoutRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CashoutRequests::PayoutId).uuid().not_null())
                        .col(ColumnDef::new(CashoutRequests::FundraiserId).uuid().not_null())
                        .col(ColumnDef::new(CashoutRequests::RequestedBy).uuid().not_null())
                        .col(ColumnDef::new(CashoutRequests::Method).string_len(16).not_null())
                        .col(ColumnDef::new(CashoutRequests::Contact).string().not_null())
                        .col(ColumnDef::new(CashoutRequests::ClientKey).string().not_null())
                        .col(
                            ColumnDef::new(CashoutRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cashout_requests_payout_id")
                                .from(CashoutRequests::Table, CashoutRequests::PayoutId)
                                .to(Payouts::Table, Payouts::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cashout_requests_payout_id")
                        .table(CashoutRequests::Table)
                        .col(CashoutRequests::PayoutId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CashoutRequests::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Payouts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payouts {
        Table,
        Id,
        FundraiserId,
        Currency,
        TotalGross,
        TotalFees,
        TotalNet,
        TransactionCount,
        Status,
        PayoutMethod,
        PayoutReference,
        Notes,
        RequestedBy,
        RequestedAt,
        CreatedAt,
        UpdatedAt,
        PayoutDate,
    }

    #[derive(DeriveIden)]
    enum CashoutRequests {
        Table,
        Id,
        PayoutId,
        FundraiserId,
        RequestedBy,
        Method,
        Contact,
        ClientKey,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Fundraisers {
        Table,
        Id,
    }
}

mod m20240601_000005_create_volunteer_signups_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_volunteer_signups_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(VolunteerSignups::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(VolunteerSignups::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(VolunteerSignups::FundraiserId).uuid().not_null())
                        .col(ColumnDef::new(VolunteerSignups::Name).string().not_null())
                        .col(ColumnDef::new(VolunteerSignups::Email).string().not_null())
                        .col(ColumnDef::new(VolunteerSignups::Phone).string().null())
                        .col(ColumnDef::new(VolunteerSignups::Role).string().null())
                        .col(ColumnDef::new(VolunteerSignups::Shift).string().null())
                        .col(
                            ColumnDef::new(VolunteerSignups::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_volunteer_signups_fundraiser_id")
                        .table(VolunteerSignups::Table)
                        .col(VolunteerSignups::FundraiserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(VolunteerSignups::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum VolunteerSignups {
        Table,
        Id,
        FundraiserId,
        Name,
        Email,
        Phone,
        Role,
        Shift,
        CreatedAt,
    }
}
