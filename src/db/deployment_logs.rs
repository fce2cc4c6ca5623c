//! Catalog queries for deployment logs.
//!
//! Logs are append-only: rows are inserted during ingestion and only removed
//! together with their project.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entity::deployment_log::{self, ActiveModel, Entity as DeploymentLog};
use crate::entity::project::Entity as Project;
use crate::error::{AppError, AppResult};

use super::DbPool;

/// Append one row per message for a project.
pub async fn append_logs<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
    messages: &[String],
) -> AppResult<()> {
    for message in messages {
        let model = ActiveModel {
            id: Set(Uuid::now_v7()),
            project_id: Set(project_id),
            log_message: Set(message.clone()),
            timestamp: Set(Utc::now()),
        };
        model
            .insert(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert deployment log: {}", e)))?;
    }
    Ok(())
}

impl DbPool {
    /// Logs for a project, oldest first.
    pub async fn get_project_logs(&self, project_id: Uuid) -> AppResult<Vec<deployment_log::Model>> {
        DeploymentLog::find()
            .filter(deployment_log::Column::ProjectId.eq(project_id))
            .order_by_asc(deployment_log::Column::Timestamp)
            .order_by_asc(deployment_log::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get deployment logs: {}", e)))
    }

    /// Every log row with its project's name, newest first.
    pub async fn list_all_logs(
        &self,
    ) -> AppResult<Vec<(deployment_log::Model, Option<String>)>> {
        let rows = DeploymentLog::find()
            .find_also_related(Project)
            .order_by_desc(deployment_log::Column::Timestamp)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list deployment logs: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(log, project)| (log, project.map(|p| p.name)))
            .collect())
    }
}
