//! Creates the `table_configs` table.
//!
//! A table configuration maps one remote PDS table onto a destination. Both
//! connection references use `RESTRICT` so a referenced connection cannot be
//! dropped from under a configuration.

use sea_orm_migration::prelude::*;

use crate::m2026_01_05_000100_create_connections::Connections;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TableConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TableConfigs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TableConfigs::ConfigName).text().not_null())
                    .col(ColumnDef::new(TableConfigs::TableName).text().not_null())
                    .col(ColumnDef::new(TableConfigs::Title).text().null())
                    .col(
                        ColumnDef::new(TableConfigs::SourceConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TableConfigs::DestinationConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TableConfigs::PageSize)
                            .integer()
                            .not_null()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(TableConfigs::BatchSize)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(
                        ColumnDef::new(TableConfigs::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TableConfigs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TableConfigs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_table_configs_source_connection")
                            .from(TableConfigs::Table, TableConfigs::SourceConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_table_configs_destination_connection")
                            .from(TableConfigs::Table, TableConfigs::DestinationConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_table_configs_config_name")
                    .table(TableConfigs::Table)
                    .col(TableConfigs::ConfigName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_table_configs_source_connection")
                    .table(TableConfigs::Table)
                    .col(TableConfigs::SourceConnectionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_table_configs_destination_connection")
                    .table(TableConfigs::Table)
                    .col(TableConfigs::DestinationConnectionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_table_configs_destination_connection",
            "idx_table_configs_source_connection",
            "idx_table_configs_config_name",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(TableConfigs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum TableConfigs {
    Table,
    Id,
    ConfigName,
    TableName,
    Title,
    SourceConnectionId,
    DestinationConnectionId,
    PageSize,
    BatchSize,
    Active,
    CreatedAt,
    UpdatedAt,
}
