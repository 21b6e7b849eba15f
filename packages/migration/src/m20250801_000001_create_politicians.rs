use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub(crate) enum Politicians {
    Table,
    Id,
    Name,
    Party,
    Chamber,
    PositionTitle,
    Electorate,
    State,
    DateElected,
    SittingStatus,
    WebsiteUrl,
    StatementCount,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Politicians::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Politicians::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Politicians::Name).string().not_null())
                    .col(ColumnDef::new(Politicians::Party).string().null())
                    .col(ColumnDef::new(Politicians::Chamber).string().null())
                    .col(ColumnDef::new(Politicians::PositionTitle).string().null())
                    .col(ColumnDef::new(Politicians::Electorate).string().null())
                    .col(ColumnDef::new(Politicians::State).string().null())
                    .col(ColumnDef::new(Politicians::DateElected).date().null())
                    .col(ColumnDef::new(Politicians::SittingStatus).string().null())
                    .col(ColumnDef::new(Politicians::WebsiteUrl).string().null())
                    .col(
                        ColumnDef::new(Politicians::StatementCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Politicians::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Politicians::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Duplicate names surface as conflicts rather than silent duplicates.
        manager
            .create_index(
                Index::create()
                    .name("ux_politicians_name")
                    .table(Politicians::Table)
                    .col(Politicians::Name)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Politicians::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}
