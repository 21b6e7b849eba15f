use sea_orm_migration::prelude::*;

use crate::m20250801_000001_create_politicians::Politicians;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Statements {
    Table,
    Id,
    Content,
    DateMade,
    PoliticianId,
    AiSummary,
    SourceUrl,
    SourceType,
    SourceName,
    ReviewStatus,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Statements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Statements::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Statements::Content).text().not_null())
                    .col(ColumnDef::new(Statements::DateMade).date().null())
                    .col(ColumnDef::new(Statements::PoliticianId).integer().not_null())
                    .col(ColumnDef::new(Statements::AiSummary).text().null())
                    .col(ColumnDef::new(Statements::SourceUrl).string_len(1024).null())
                    .col(ColumnDef::new(Statements::SourceType).string_len(50).null())
                    .col(ColumnDef::new(Statements::SourceName).string_len(255).null())
                    .col(
                        ColumnDef::new(Statements::ReviewStatus)
                            .string_len(50)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Statements::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Statements::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_statements_politician_id")
                            .from(Statements::Table, Statements::PoliticianId)
                            .to(Politicians::Table, Politicians::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_statements_politician_id")
                    .table(Statements::Table)
                    .col(Statements::PoliticianId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Statements::Table).if_exists().to_owned())
            .await
    }
}
