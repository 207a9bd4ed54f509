use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Outbox of CRM pushes, drained by the HubSpot sync job
        manager
            .create_table(
                Table::create()
                    .table(CrmSyncEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CrmSyncEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CrmSyncEvents::Kind).string_len(32).not_null())
                    .col(
                        ColumnDef::new(CrmSyncEvents::SubjectEmail)
                            .string_len(254)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CrmSyncEvents::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(CrmSyncEvents::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CrmSyncEvents::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CrmSyncEvents::LastError).text().null())
                    .col(
                        ColumnDef::new(CrmSyncEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CrmSyncEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_crm_sync_events_status_id")
                    .table(CrmSyncEvents::Table)
                    .col(CrmSyncEvents::Status)
                    .col(CrmSyncEvents::Id)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CrmSyncEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CrmSyncEvents {
    Table,
    Id,
    Kind,
    SubjectEmail,
    Payload,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    ProcessedAt,
}
