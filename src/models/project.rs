//! Project domain models and DTOs.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::project;
use crate::error::{AppError, AppResult};

static DATABASE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

/// Longest schema identifier the engine accepts.
const MAX_DATABASE_NAME_LEN: usize = 64;

/// Project deployment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Reserved for asynchronous ingestion variants.
    Queued,
    Deployed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "deployed" => Some(Self::Deployed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive the URL slug (and deployment folder name) from a display name.
///
/// Lowercases, turns whitespace runs into a single hyphen, drops every other
/// character outside `[a-z0-9-]`, then collapses and trims hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if (c == '-' || c.is_whitespace()) && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Slug for a display name, rejecting names that produce an empty slug.
pub fn slug_for(name: &str) -> AppResult<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(AppError::Validation(
            "Project name must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(slug)
}

/// Check a schema identifier against `^[A-Za-z0-9_]+$`.
pub fn validate_database_name(name: &str) -> AppResult<()> {
    if !DATABASE_NAME_RE.is_match(name) {
        return Err(AppError::Validation(
            "Database name can only contain letters, numbers, and underscores".to_string(),
        ));
    }
    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Database name must be at most {} characters",
            MAX_DATABASE_NAME_LEN
        )));
    }
    Ok(())
}

/// Project as returned to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub database_name: String,
    pub upload_path: String,
    pub url: String,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<project::Model> for ProjectResponse {
    fn from(m: project::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            status: ProjectStatus::parse(&m.status).unwrap_or(ProjectStatus::Failed),
            name: m.name,
            description: m.description,
            database_name: m.database_name,
            upload_path: m.upload_path,
            url: m.url,
            error_log: m.error_log,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Owner list entry with the newest deployment log line.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub latest_log: Option<String>,
}

/// Publicly listed deployed project.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicProject {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<project::Model> for PublicProject {
    fn from(m: project::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            url: m.url,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Project detail with its deployment history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub logs: Vec<super::DeploymentLogResponse>,
}

/// Rename/update request body. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub database_name: Option<String>,
}

/// Result payload of an ingestion.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestionData {
    pub project_id: Uuid,
    pub status: ProjectStatus,
    pub url: String,
    pub errors: Vec<String>,
    pub successful_files: Vec<String>,
}

/// `project-info.json` sidecar written into each deployed folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectInfo {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub database: String,
    pub url: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub created_at: String,
    pub status: String,
}
