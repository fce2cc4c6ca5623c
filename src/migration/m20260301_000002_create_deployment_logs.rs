//! Create deployment_logs table.

use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_projects::Project;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeploymentLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeploymentLog::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeploymentLog::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(DeploymentLog::LogMessage).text().not_null())
                    .col(
                        ColumnDef::new(DeploymentLog::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DeploymentLog::Table, DeploymentLog::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deployment_logs_project")
                    .table(DeploymentLog::Table)
                    .col(DeploymentLog::ProjectId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeploymentLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeploymentLog {
    #[sea_orm(iden = "deployment_logs")]
    Table,
    Id,
    ProjectId,
    LogMessage,
    Timestamp,
}
