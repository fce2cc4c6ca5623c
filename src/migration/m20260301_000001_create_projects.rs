//! Create projects table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Project::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Project::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Project::UserId).uuid().not_null())
                    .col(ColumnDef::new(Project::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Project::Description).text())
                    .col(ColumnDef::new(Project::DatabaseName).string_len(64).not_null())
                    .col(ColumnDef::new(Project::UploadPath).string_len(1024).not_null())
                    .col(ColumnDef::new(Project::Url).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Project::Status)
                            .string_len(20)
                            .not_null()
                            .default("queued"),
                    )
                    .col(ColumnDef::new(Project::ErrorLog).text())
                    .col(
                        ColumnDef::new(Project::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Project::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_projects_url_unique")
                    .table(Project::Table)
                    .col(Project::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_projects_database_name_unique")
                    .table(Project::Table)
                    .col(Project::DatabaseName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_projects_user")
                    .table(Project::Table)
                    .col(Project::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Project::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Project {
    #[sea_orm(iden = "projects")]
    Table,
    Id,
    UserId,
    Name,
    Description,
    DatabaseName,
    UploadPath,
    Url,
    Status,
    ErrorLog,
    CreatedAt,
    UpdatedAt,
}
