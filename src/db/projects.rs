//! Catalog queries for projects.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::entity::deployment_log::{self, Entity as DeploymentLog};
use crate::entity::project::{self, ActiveModel, Entity as Project};
use crate::error::{AppError, AppResult};
use crate::models::ProjectStatus;

use super::DbPool;

/// Values for the project row written by an ingestion.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub database_name: String,
    pub upload_path: String,
    pub url: String,
    pub status: ProjectStatus,
    pub error_log: Option<String>,
}

/// Column changes applied by a rename. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub url: Option<String>,
    pub upload_path: Option<String>,
    pub description: Option<String>,
    pub database_name: Option<String>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.upload_path.is_none()
            && self.description.is_none()
            && self.database_name.is_none()
    }
}

/// Map a unique-index violation to a conflict; everything else stays a database error.
fn map_write_error(context: &str, err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            AppError::Conflict(format!("{}: slug or database name already taken ({})", context, detail))
        }
        _ => AppError::Database(format!("{}: {}", context, err)),
    }
}

impl DbPool {
    /// Get a project by ID.
    pub async fn get_project(&self, id: Uuid) -> AppResult<Option<project::Model>> {
        Project::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get project: {}", e)))
    }

    /// Get a project and verify the caller owns it.
    pub async fn get_owned_project(&self, id: Uuid, user_id: Uuid) -> AppResult<project::Model> {
        let project = self
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {}", id)))?;

        if project.user_id != user_id {
            return Err(AppError::Forbidden(
                "Not authorized to modify this project".to_string(),
            ));
        }

        Ok(project)
    }

    /// Whether another project already uses this URL slug.
    pub async fn url_taken(&self, url: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        let mut select = Project::find().filter(project::Column::Url.eq(url));
        if let Some(id) = exclude {
            select = select.filter(project::Column::Id.ne(id));
        }
        let found = select
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to check project url: {}", e)))?;
        Ok(found.is_some())
    }

    /// Insert the project row and its deployment logs in one transaction.
    pub async fn record_ingestion(
        &self,
        new: NewProject,
        log_messages: &[String],
    ) -> AppResult<project::Model> {
        let now = Utc::now();
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let model = ActiveModel {
            id: Set(new.id),
            user_id: Set(new.user_id),
            name: Set(new.name),
            description: Set(new.description),
            database_name: Set(new.database_name),
            upload_path: Set(new.upload_path),
            url: Set(new.url),
            status: Set(new.status.as_str().to_string()),
            error_log: Set(new.error_log),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = model
            .insert(&txn)
            .await
            .map_err(|e| map_write_error("Failed to insert project", e))?;

        super::deployment_logs::append_logs(&txn, inserted.id, log_messages).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit project insert: {}", e)))?;

        info!(
            "Recorded project {} ({} log entries)",
            inserted.id,
            log_messages.len()
        );
        Ok(inserted)
    }

    /// List a user's projects, newest first, with the latest log message of each.
    pub async fn list_projects_for_user(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(project::Model, Option<String>)>> {
        let projects = Project::find()
            .filter(project::Column::UserId.eq(user_id))
            .order_by_desc(project::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list projects: {}", e)))?;

        if projects.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
        let logs = DeploymentLog::find()
            .filter(deployment_log::Column::ProjectId.is_in(ids))
            .order_by_desc(deployment_log::Column::Timestamp)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list deployment logs: {}", e)))?;

        let mut latest: HashMap<Uuid, String> = HashMap::new();
        for log in logs {
            latest.entry(log.project_id).or_insert(log.log_message);
        }

        Ok(projects
            .into_iter()
            .map(|p| {
                let log = latest.remove(&p.id);
                (p, log)
            })
            .collect())
    }

    /// Deployed projects with a non-empty URL, newest first.
    pub async fn list_public_projects(&self) -> AppResult<Vec<project::Model>> {
        Project::find()
            .filter(project::Column::Status.eq(ProjectStatus::Deployed.as_str()))
            .filter(project::Column::Url.ne(""))
            .order_by_desc(project::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list public projects: {}", e)))
    }

    /// Every project, newest first.
    pub async fn list_all_projects(&self) -> AppResult<Vec<project::Model>> {
        Project::find()
            .order_by_desc(project::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list projects: {}", e)))
    }

    /// Delete a project row and its logs in one transaction.
    ///
    /// Returns false if the row was already gone.
    pub async fn delete_project_row(&self, id: Uuid) -> AppResult<bool> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        DeploymentLog::delete_many()
            .filter(deployment_log::Column::ProjectId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete deployment logs: {}", e)))?;

        let result = Project::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete project: {}", e)))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit project delete: {}", e)))?;

        Ok(result.rows_affected > 0)
    }
}

/// Apply rename changes to a project row on the given connection or transaction.
pub async fn apply_changes<C: ConnectionTrait>(
    conn: &C,
    current: project::Model,
    changes: &ProjectChanges,
) -> AppResult<project::Model> {
    let mut active: ActiveModel = current.into();
    if let Some(ref name) = changes.name {
        active.name = Set(name.clone());
    }
    if let Some(ref url) = changes.url {
        active.url = Set(url.clone());
    }
    if let Some(ref path) = changes.upload_path {
        active.upload_path = Set(path.clone());
    }
    if let Some(ref description) = changes.description {
        active.description = Set(Some(description.clone()));
    }
    if let Some(ref database_name) = changes.database_name {
        active.database_name = Set(database_name.clone());
    }
    active.updated_at = Set(Utc::now());

    active
        .update(conn)
        .await
        .map_err(|e| map_write_error("Failed to update project", e))
}
