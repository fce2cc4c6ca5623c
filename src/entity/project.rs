//! Project entity: one row per ingested project.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[sea_orm(unique)]
    pub database_name: String,
    pub upload_path: String,
    #[sea_orm(unique)]
    pub url: String,
    pub status: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_log: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::deployment_log::Entity")]
    DeploymentLog,
}

impl Related<super::deployment_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeploymentLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
