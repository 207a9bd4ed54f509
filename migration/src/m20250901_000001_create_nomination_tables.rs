use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Nominations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Nominations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Nominations::Category).string_len(64).not_null())
                    .col(ColumnDef::new(Nominations::NomineeType).string_len(16).not_null())
                    .col(ColumnDef::new(Nominations::NomineeName).string_len(201).not_null())
                    .col(ColumnDef::new(Nominations::NomineeFirstName).string_len(100).null())
                    .col(ColumnDef::new(Nominations::NomineeLastName).string_len(100).null())
                    .col(ColumnDef::new(Nominations::NomineeEmail).string_len(254).null())
                    .col(ColumnDef::new(Nominations::NomineeJobTitle).string_len(100).null())
                    .col(ColumnDef::new(Nominations::NomineeCompany).string_len(100).null())
                    .col(ColumnDef::new(Nominations::LinkedinUrl).string_len(256).not_null())
                    .col(ColumnDef::new(Nominations::WebsiteUrl).string_len(512).null())
                    .col(ColumnDef::new(Nominations::ImageUrl).string_len(1024).null())
                    .col(ColumnDef::new(Nominations::WhyNominated).text().not_null())
                    .col(ColumnDef::new(Nominations::NominatorName).string_len(201).not_null())
                    .col(ColumnDef::new(Nominations::NominatorEmail).string_len(254).not_null())
                    .col(
                        ColumnDef::new(Nominations::Status)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Nominations::LiveSlug).string_len(256).null())
                    .col(
                        ColumnDef::new(Nominations::Source)
                            .string_len(16)
                            .not_null()
                            .default("public"),
                    )
                    .col(
                        ColumnDef::new(Nominations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Nominations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Nominations::ModeratedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One nomination per nominee and category
        manager
            .create_index(
                Index::create()
                    .name("idx_nominations_category_linkedin")
                    .table(Nominations::Table)
                    .col(Nominations::Category)
                    .col(Nominations::LinkedinUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nominations_live_slug")
                    .table(Nominations::Table)
                    .col(Nominations::LiveSlug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nominations_status_category")
                    .table(Nominations::Table)
                    .col(Nominations::Status)
                    .col(Nominations::Category)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Votes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Votes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Votes::NominationId).big_integer().not_null())
                    .col(ColumnDef::new(Votes::Category).string_len(64).not_null())
                    .col(ColumnDef::new(Votes::VoterEmail).string_len(254).not_null())
                    .col(ColumnDef::new(Votes::VoterFirstName).string_len(100).not_null())
                    .col(ColumnDef::new(Votes::VoterLastName).string_len(100).not_null())
                    .col(ColumnDef::new(Votes::VoterLinkedinUrl).string_len(256).null())
                    .col(
                        ColumnDef::new(Votes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_votes_nomination")
                            .from(Votes::Table, Votes::NominationId)
                            .to(Nominations::Table, Nominations::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One vote per voter and category
        manager
            .create_index(
                Index::create()
                    .name("idx_votes_voter_category")
                    .table(Votes::Table)
                    .col(Votes::VoterEmail)
                    .col(Votes::Category)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_votes_nomination")
                    .table(Votes::Table)
                    .col(Votes::NominationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Votes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Nominations::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Nominations {
    Table,
    Id,
    Category,
    NomineeType,
    NomineeName,
    NomineeFirstName,
    NomineeLastName,
    NomineeEmail,
    NomineeJobTitle,
    NomineeCompany,
    LinkedinUrl,
    WebsiteUrl,
    ImageUrl,
    WhyNominated,
    NominatorName,
    NominatorEmail,
    Status,
    LiveSlug,
    Source,
    CreatedAt,
    UpdatedAt,
    ModeratedAt,
}

#[derive(DeriveIden)]
enum Votes {
    Table,
    Id,
    NominationId,
    Category,
    VoterEmail,
    VoterFirstName,
    VoterLastName,
    VoterLinkedinUrl,
    CreatedAt,
}
