//! Project ingestion: archive → schema replay → deployment → config
//! rewrite → catalog record.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::projects::NewProject;
use crate::entity::project;
use crate::error::{AppError, AppResult};
use crate::models::{
    DEPLOY_SUCCESS_MESSAGE, IngestionData, ProjectInfo, ProjectStatus, slug_for,
    validate_database_name,
};
use crate::services::archive::{self, ScratchTree};
use crate::services::config_rewriter::{self, ConfigTarget};
use crate::services::deployment::{self, DeployRequest, ProjectType};
use crate::services::locks::OperationLocks;
use crate::services::sql_replay::{self, ReplayReport};
use crate::services::{ProjectServices, run_blocking};

/// Format of `created_at` in the sidecar and the placeholder page.
pub const INFO_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inputs of one ingestion.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub user_id: Uuid,
    pub name: String,
    pub database_name: String,
    pub description: Option<String>,
    /// Uploaded archive on local disk; owned by the caller
    pub archive: PathBuf,
}

/// What an ingestion produced.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub project: project::Model,
    pub project_type: ProjectType,
    pub errors: Vec<String>,
    pub successful_files: Vec<String>,
}

impl IngestionOutcome {
    pub fn status(&self) -> ProjectStatus {
        if self.errors.is_empty() {
            ProjectStatus::Deployed
        } else {
            ProjectStatus::Failed
        }
    }

    pub fn data(&self) -> IngestionData {
        IngestionData {
            project_id: self.project.id,
            status: self.status(),
            url: self.project.url.clone(),
            errors: self.errors.clone(),
            successful_files: self.successful_files.clone(),
        }
    }
}

impl ProjectServices {
    /// Ingest an uploaded project.
    ///
    /// Either the project ends up recorded with its schema and folder, or
    /// neither the schema nor the folder is left behind. Replay errors do not
    /// fail the ingestion; they set the status to `failed`.
    pub async fn ingest(&self, req: IngestionRequest) -> AppResult<IngestionOutcome> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Project name is required".to_string()));
        }
        validate_database_name(&req.database_name)?;
        let slug = slug_for(&name)?;

        let _guard = self
            .locks
            .acquire([
                OperationLocks::database_key(&req.database_name),
                OperationLocks::slug_key(&slug),
            ])
            .await;

        self.ensure_available(&req.database_name, &slug, None).await?;
        if self.storage.web_root.join(&slug).exists() {
            return Err(AppError::Deployment(format!(
                "Project folder '{}' already exists",
                slug
            )));
        }

        let archive_path = req.archive.clone();
        let scratch_parent = self.storage.scratch_dir.clone();
        let scratch =
            run_blocking(move || archive::extract_archive(&archive_path, &scratch_parent)).await?;
        info!(
            "Staged {} file(s) for project '{}' (database {})",
            scratch.entries(),
            name,
            req.database_name
        );

        self.admin
            .create_schema(&req.database_name)
            .await
            .map_err(|e| {
                if e.is_schema_collision() {
                    AppError::Conflict(format!("Database '{}' already exists", req.database_name))
                } else {
                    AppError::Database(format!(
                        "Failed to create database '{}': {}",
                        req.database_name, e
                    ))
                }
            })?;

        match self.provision(&req, &name, &slug, &scratch).await {
            Ok(outcome) => {
                info!(
                    "Ingested project {} ({}) as {} with {} replay error(s)",
                    outcome.project.id,
                    slug,
                    outcome.status(),
                    outcome.errors.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                self.discard_schema(&req.database_name).await;
                Err(e)
            }
        }
        // `scratch` drops here and removes the extracted tree.
    }

    /// Reject names that are visibly taken.
    ///
    /// This is a pre-filter: the schema create, the non-recursive folder
    /// create and the catalog's unique indexes are the real guards.
    pub(crate) async fn ensure_available(
        &self,
        database_name: &str,
        slug: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        let exists = self
            .admin
            .schema_exists(database_name)
            .await
            .map_err(|e| AppError::Database(format!("Failed to check database name: {}", e)))?;
        if exists {
            return Err(AppError::Conflict(format!(
                "Database '{}' already exists",
                database_name
            )));
        }

        if self.pool.url_taken(slug, exclude).await? {
            return Err(AppError::Conflict(format!(
                "A project with URL '{}' already exists",
                slug
            )));
        }

        Ok(())
    }

    async fn provision(
        &self,
        req: &IngestionRequest,
        name: &str,
        slug: &str,
        scratch: &ScratchTree,
    ) -> AppResult<IngestionOutcome> {
        let report = self.replay(&req.database_name, scratch).await?;
        let errors = report.error_messages();
        let status = if errors.is_empty() {
            ProjectStatus::Deployed
        } else {
            ProjectStatus::Failed
        };

        let project_id = Uuid::now_v7();
        let description = req
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Project database: {}", req.database_name));

        let mut info = ProjectInfo {
            id: project_id,
            name: name.to_string(),
            description: description.clone(),
            database: req.database_name.clone(),
            url: slug.to_string(),
            project_type: String::new(),
            created_at: Utc::now().format(INFO_TIMESTAMP_FORMAT).to_string(),
            status: status.as_str().to_string(),
        };

        let deployed = {
            let extracted = scratch.path().to_path_buf();
            let web_root = self.storage.web_root.clone();
            let base = self.storage.public_base_path.clone();
            let slug = slug.to_string();
            let info = info.clone();
            run_blocking(move || {
                deployment::deploy(&DeployRequest {
                    extracted: &extracted,
                    web_root: &web_root,
                    slug: &slug,
                    public_base_path: &base,
                    info: &info,
                })
            })
            .await?
        };
        info.project_type = deployed.project_type.as_str().to_string();
        if deployed.generated_index {
            info!("No entry file in {}, generated index.html", slug);
        }

        {
            let dir = deployed.dir.clone();
            let database = req.database_name.clone();
            let credentials = self.credentials.clone();
            let patched = run_blocking(move || {
                let target = ConfigTarget {
                    database: &database,
                    credentials: &credentials,
                };
                Ok(config_rewriter::rewrite_project_configs(&dir, &target))
            })
            .await;
            if let Err(e) = patched {
                warn!("Config rewrite for {} did not run: {}", slug, e);
            }
        }

        let log_messages = if errors.is_empty() {
            vec![DEPLOY_SUCCESS_MESSAGE.to_string()]
        } else {
            errors.clone()
        };
        let new_project = NewProject {
            id: project_id,
            user_id: req.user_id,
            name: name.to_string(),
            description: Some(description),
            database_name: req.database_name.clone(),
            upload_path: deployed.dir.to_string_lossy().into_owned(),
            url: slug.to_string(),
            status,
            error_log: (!errors.is_empty()).then(|| errors.join("\n")),
        };

        let project = match self.pool.record_ingestion(new_project, &log_messages).await {
            Ok(project) => project,
            Err(e) => {
                error!("Failed to record project {}: {}", slug, e);
                let dir = deployed.dir.clone();
                if let Err(cleanup) = run_blocking(move || {
                    crate::services::fs_ops::remove_dir(&dir)
                        .map_err(|e| AppError::FileSystem(e.to_string()))
                })
                .await
                {
                    warn!("Failed to remove folder of unrecorded project {}: {}", slug, cleanup);
                }
                return Err(e);
            }
        };

        let dir = deployed.dir.clone();
        let sidecar = info.clone();
        if let Err(e) = run_blocking(move || {
            deployment::write_project_info(&dir, &sidecar)
                .map_err(|e| AppError::FileSystem(e.to_string()))
        })
        .await
        {
            warn!("Failed to write project info for {}: {}", slug, e);
        }

        Ok(IngestionOutcome {
            project,
            project_type: deployed.project_type,
            errors,
            successful_files: report.successful_files(),
        })
    }

    async fn replay(&self, database_name: &str, scratch: &ScratchTree) -> AppResult<ReplayReport> {
        let session = self.admin.open(database_name).await.map_err(|e| {
            AppError::Database(format!("Failed to open database '{}': {}", database_name, e))
        })?;
        Ok(sql_replay::replay_tree(session.as_ref(), scratch.path()).await)
    }

    /// Drop a schema created by a failed operation; failures are only logged.
    pub(crate) async fn discard_schema(&self, name: &str) {
        match self.admin.drop_schema(name).await {
            Ok(()) => info!("Discarded schema {}", name),
            Err(e) => error!("Failed to discard schema {}: {}", name, e),
        }
    }
}
