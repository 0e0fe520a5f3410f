//! Creates the `table_columns` table with one row per declared column.

use sea_orm_migration::prelude::*;

use crate::m2026_01_05_000200_create_table_configs::TableConfigs;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TableColumns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TableColumns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TableColumns::TableConfigId).uuid().not_null())
                    .col(ColumnDef::new(TableColumns::ColumnName).text().not_null())
                    .col(
                        ColumnDef::new(TableColumns::DataType)
                            .text()
                            .not_null()
                            .default("string"),
                    )
                    .col(
                        ColumnDef::new(TableColumns::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TableColumns::IsPrimaryKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TableColumns::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TableColumns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TableColumns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_table_columns_table_config")
                            .from(TableColumns::Table, TableColumns::TableConfigId)
                            .to(TableConfigs::Table, TableConfigs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Column names are unique within a configuration
        manager
            .create_index(
                Index::create()
                    .name("idx_table_columns_config_name")
                    .table(TableColumns::Table)
                    .col(TableColumns::TableConfigId)
                    .col(TableColumns::ColumnName)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_table_columns_config_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TableColumns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TableColumns {
    Table,
    Id,
    TableConfigId,
    ColumnName,
    DataType,
    Active,
    IsPrimaryKey,
    Position,
    CreatedAt,
    UpdatedAt,
}
