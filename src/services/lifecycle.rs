//! Rename and delete of deployed projects.
//!
//! A rename touches the catalog, the web root and the engine. Only the
//! catalog update is transactional; the folder move and the schema copy
//! carry their own compensation so that on failure the old folder and old
//! schema stay authoritative and the new ones are gone.

use std::path::{Path, PathBuf};

use sea_orm::TransactionTrait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::projects::{ProjectChanges, apply_changes};
use crate::entity::project;
use crate::error::{AppError, AppResult};
use crate::models::{ProjectInfo, UpdateProjectRequest, slug_for, validate_database_name};
use crate::services::deployment::{self, PROJECT_INFO_FILE};
use crate::services::locks::OperationLocks;
use crate::services::schema_admin::{EngineError, SchemaSession};
use crate::services::{ProjectServices, config_rewriter, fs_ops, run_blocking};

/// Tables that commonly store connection settings.
const SETTINGS_TABLES: &[&str] = &["config", "settings", "connections", "databases"];

/// Column name fragments that mark a settings column worth patching.
const SETTINGS_COLUMN_HINTS: &[&str] = &["database", "db", "connection"];

/// A planned rename, computed from the request and the current row.
#[derive(Debug, Clone, Default)]
struct RenamePlan {
    changes: ProjectChanges,
    new_slug: Option<String>,
    new_database: Option<String>,
}

impl ProjectServices {
    /// Rename a project owned by `user_id`.
    pub async fn rename(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateProjectRequest,
    ) -> AppResult<project::Model> {
        let _project_guard = self
            .locks
            .acquire([OperationLocks::project_key(id)])
            .await;

        let current = self.pool.get_owned_project(id, user_id).await?;
        let plan = self.plan_rename(&current, &req)?;
        if plan.changes.is_empty() {
            return Err(AppError::Validation("No valid updates provided".to_string()));
        }

        let mut keys = Vec::new();
        if let Some(ref slug) = plan.new_slug {
            keys.push(OperationLocks::slug_key(slug));
        }
        if let Some(ref db) = plan.new_database {
            keys.push(OperationLocks::database_key(db));
        }
        let _name_guard = self.locks.acquire(keys).await;

        self.check_rename_targets(&current, &plan).await?;
        self.apply_rename(current, plan).await
    }

    fn plan_rename(
        &self,
        current: &project::Model,
        req: &UpdateProjectRequest,
    ) -> AppResult<RenamePlan> {
        let mut plan = RenamePlan::default();

        if let Some(ref name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("Project name cannot be empty".to_string()));
            }
            if name != current.name {
                plan.changes.name = Some(name.to_string());
                let slug = slug_for(name)?;
                if slug != current.url {
                    plan.changes.url = Some(slug.clone());
                    plan.changes.upload_path = Some(
                        self.storage
                            .web_root
                            .join(&slug)
                            .to_string_lossy()
                            .into_owned(),
                    );
                    plan.new_slug = Some(slug);
                }
            }
        }

        if let Some(ref description) = req.description
            && current.description.as_deref() != Some(description.as_str())
        {
            plan.changes.description = Some(description.clone());
        }

        if let Some(ref database) = req.database_name
            && *database != current.database_name
        {
            validate_database_name(database)?;
            plan.changes.database_name = Some(database.clone());
            plan.new_database = Some(database.clone());
        }

        Ok(plan)
    }

    /// Reject a rename whose targets are taken, before anything is copied.
    async fn check_rename_targets(
        &self,
        current: &project::Model,
        plan: &RenamePlan,
    ) -> AppResult<()> {
        if let Some(ref db) = plan.new_database {
            let exists = self
                .admin
                .schema_exists(db)
                .await
                .map_err(|e| AppError::Database(format!("Failed to check database name: {}", e)))?;
            if exists {
                return Err(AppError::Conflict(format!("Database '{}' already exists", db)));
            }
        }

        if let Some(ref slug) = plan.new_slug {
            if self.pool.url_taken(slug, Some(current.id)).await? {
                return Err(AppError::Conflict(format!(
                    "A project with URL '{}' already exists",
                    slug
                )));
            }
            if self.storage.web_root.join(slug).exists() {
                return Err(AppError::Conflict(format!(
                    "Project folder '{}' already exists",
                    slug
                )));
            }
        }

        Ok(())
    }

    async fn apply_rename(
        &self,
        current: project::Model,
        plan: RenamePlan,
    ) -> AppResult<project::Model> {
        let old_dir = PathBuf::from(&current.upload_path);
        let old_database = current.database_name.clone();

        let txn = self
            .pool
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = match apply_changes(&txn, current.clone(), &plan.changes).await {
            Ok(updated) => updated,
            Err(e) => {
                rollback(txn).await;
                return Err(e);
            }
        };

        // Folder move
        let moved_dir = match plan.changes.upload_path {
            Some(ref new_path) => {
                let new_dir = PathBuf::from(new_path);
                if let Err(e) = move_folder(&old_dir, &new_dir).await {
                    rollback(txn).await;
                    return Err(AppError::Lifecycle(format!("Failed to move project folder: {}", e)));
                }
                Some(new_dir)
            }
            None => None,
        };

        // Database copy
        if let Some(ref new_database) = plan.new_database
            && let Err(e) = self.copy_schema(&old_database, new_database).await
        {
            error!(
                "Copying schema {} -> {} failed: {}",
                old_database, new_database, e
            );
            rollback(txn).await;
            if let Some(ref new_dir) = moved_dir {
                restore_folder(new_dir, &old_dir).await;
            }
            return Err(AppError::Lifecycle(format!(
                "Failed to copy database '{}' to '{}': {}",
                old_database, new_database, e
            )));
        }

        if let Err(e) = txn.commit().await {
            error!("Failed to commit rename of project {}: {}", current.id, e);
            if let Some(ref new_database) = plan.new_database {
                self.discard_schema(new_database).await;
            }
            if let Some(ref new_dir) = moved_dir {
                restore_folder(new_dir, &old_dir).await;
            }
            return Err(AppError::Database(format!("Failed to commit rename: {}", e)));
        }

        // Committed. Everything below is best effort.
        let folder = moved_dir.unwrap_or(old_dir);
        if let Some(ref new_database) = plan.new_database {
            let dir = folder.clone();
            let old = old_database.clone();
            let new = new_database.clone();
            if let Err(e) = run_blocking(move || {
                Ok(config_rewriter::replace_schema_references(&dir, &old, &new))
            })
            .await
            {
                warn!("Config rewrite after rename did not run: {}", e);
            }
        }

        self.refresh_project_info(&folder, &updated).await;

        if plan.new_database.is_some()
            && let Err(e) = self.admin.drop_schema(&old_database).await
        {
            warn!("Failed to drop old schema {}: {}", old_database, e);
        }

        info!("Renamed project {} ({})", updated.id, updated.url);
        Ok(updated)
    }

    /// Copy every table and row of `old` into a new schema `new`.
    ///
    /// On failure the new schema is dropped and `old` is untouched.
    async fn copy_schema(&self, old: &str, new: &str) -> Result<usize, EngineError> {
        self.admin.create_schema(new).await?;

        match self.copy_tables(old, new).await {
            Ok(count) => {
                info!("Copied {} table(s) from {} to {}", count, old, new);
                Ok(count)
            }
            Err(e) => {
                self.discard_schema(new).await;
                Err(e)
            }
        }
    }

    async fn copy_tables(&self, old: &str, new: &str) -> Result<usize, EngineError> {
        let source = self.admin.open(old).await?;
        let target = self.admin.open(new).await?;

        let mut plain = Vec::new();
        let mut keyed = Vec::new();
        for table in source.list_tables().await? {
            if source.has_foreign_keys(&table).await? {
                keyed.push(table);
            } else {
                plain.push(table);
            }
        }

        target.set_foreign_key_checks(false).await?;
        let copied = copy_each(source.as_ref(), target.as_ref(), old, &plain, &keyed).await;
        let restored = target.set_foreign_key_checks(true).await;
        copied?;
        restored?;

        for table in &keyed {
            target.check_table(table).await?;
        }

        patch_settings_tables(target.as_ref(), old, new).await;
        Ok(plain.len() + keyed.len())
    }

    /// Rewrite the sidecar from the committed row, keeping its type.
    async fn refresh_project_info(&self, dir: &Path, project: &project::Model) {
        let target = dir.to_path_buf();
        let project = project.clone();
        let result = run_blocking(move || {
            let dir = target;
            let path = dir.join(PROJECT_INFO_FILE);
            let previous: Option<ProjectInfo> = std::fs::read_to_string(&path)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok());

            let info = ProjectInfo {
                id: project.id,
                name: project.name.clone(),
                description: project.description.clone().unwrap_or_default(),
                database: project.database_name.clone(),
                url: project.url.clone(),
                project_type: previous
                    .as_ref()
                    .map(|p| p.project_type.clone())
                    .unwrap_or_else(|| deployment::detect_project_type(&dir).as_str().to_string()),
                created_at: previous
                    .map(|p| p.created_at)
                    .unwrap_or_else(|| {
                        project
                            .created_at
                            .format(super::ingestion::INFO_TIMESTAMP_FORMAT)
                            .to_string()
                    }),
                status: project.status.clone(),
            };
            deployment::write_project_info(&dir, &info)
                .map_err(|e| AppError::FileSystem(e.to_string()))
        })
        .await;

        if let Err(e) = result {
            warn!("Failed to update project info in {}: {}", dir.display(), e);
        }
    }

    /// Delete a project.
    ///
    /// With `owner` set the caller must own the project. Schema and folder
    /// removal are best effort; only the catalog delete must succeed.
    pub async fn delete(&self, id: Uuid, owner: Option<Uuid>) -> AppResult<()> {
        let _guard = self
            .locks
            .acquire([OperationLocks::project_key(id)])
            .await;

        let project = match owner {
            Some(user_id) => self.pool.get_owned_project(id, user_id).await?,
            None => self
                .pool
                .get_project(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Project {}", id)))?,
        };

        if let Err(e) = self.admin.drop_schema(&project.database_name).await {
            warn!(
                "Failed to drop schema {} of project {}: {}",
                project.database_name, id, e
            );
        }

        let dir = PathBuf::from(&project.upload_path);
        if dir.starts_with(&self.storage.web_root) {
            let target = dir.clone();
            if let Err(e) = run_blocking(move || {
                fs_ops::remove_dir(&target).map_err(|e| AppError::FileSystem(e.to_string()))
            })
            .await
            {
                warn!("Failed to remove folder {}: {}", dir.display(), e);
            }
        } else {
            warn!(
                "Not removing {} for project {}: outside the web root",
                dir.display(),
                id
            );
        }

        let removed = self.pool.delete_project_row(id).await?;
        if !removed {
            warn!("Project {} row was already gone", id);
        }

        info!("Deleted project {} ({})", id, project.url);
        Ok(())
    }
}

async fn rollback(txn: sea_orm::DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        error!("Failed to roll back transaction: {}", e);
    }
}

async fn move_folder(from: &Path, to: &Path) -> AppResult<()> {
    let from = from.to_path_buf();
    let to = to.to_path_buf();
    run_blocking(move || {
        fs_ops::move_dir(&from, &to).map_err(|e| {
            AppError::FileSystem(format!(
                "{} -> {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })
    })
    .await
}

/// Move a renamed folder back; failures are logged loudly.
async fn restore_folder(moved: &Path, original: &Path) {
    if let Err(e) = move_folder(moved, original).await {
        error!(
            "Failed to move {} back to {}: {}",
            moved.display(),
            original.display(),
            e
        );
    }
}

async fn copy_each(
    source: &dyn SchemaSession,
    target: &dyn SchemaSession,
    source_schema: &str,
    plain: &[String],
    keyed: &[String],
) -> Result<(), EngineError> {
    for table in plain.iter().chain(keyed) {
        let ddl = source.show_create_table(table).await?;
        target.execute(&ddl).await?;
        let rows = target.copy_rows_from(source_schema, table).await?;
        info!("Copied {} row(s) of {}", rows, table);
    }
    Ok(())
}

/// Point settings-like rows at the new schema name. Best effort.
async fn patch_settings_tables(session: &dyn SchemaSession, old: &str, new: &str) {
    for table in SETTINGS_TABLES {
        let columns = match session.columns(table).await {
            Ok(columns) => columns,
            Err(e) => {
                warn!("Cannot inspect {}: {}", table, e);
                continue;
            }
        };

        for column in columns {
            let lower = column.name.to_lowercase();
            if !SETTINGS_COLUMN_HINTS.iter().any(|h| lower.contains(h)) {
                continue;
            }
            match session.replace_in_column(table, &column.name, old, new).await {
                Ok(0) => {}
                Ok(n) => info!("Updated {} row(s) in {}.{}", n, table, column.name),
                Err(e) => warn!("Failed to update {}.{}: {}", table, column.name, e),
            }
        }
    }
}
