//! Column declaration entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Declared column of a table configuration
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "table_columns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning table configuration
    pub table_config_id: Uuid,

    /// Column name as returned by the source API, unique per configuration
    pub column_name: String,

    /// Declared data type (`string`, `integer`, `date`, ...); open-ended
    pub data_type: String,

    /// Included in sync requests when true
    pub active: bool,

    /// Part of the row identity
    pub is_primary_key: bool,

    /// Declaration order
    pub position: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::table_config::Entity",
        from = "Column::TableConfigId",
        to = "super::table_config::Column::Id",
        on_delete = "Cascade"
    )]
    TableConfig,
}

impl Related<super::table_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TableConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
