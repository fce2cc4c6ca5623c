//! Domain models for the deployment server.

use serde::Serialize;

pub mod deployment_log;
pub mod project;
pub mod user;

// Re-export commonly used types
pub use deployment_log::{AdminLogEntry, DEPLOY_SUCCESS_MESSAGE, DeploymentLogResponse};
pub use project::{
    IngestionData, ProjectDetailResponse, ProjectInfo, ProjectResponse, ProjectStatus,
    ProjectSummary, PublicProject, UpdateProjectRequest, slug_for, slugify,
    validate_database_name,
};
pub use user::SessionClaims;

/// Envelope used by every successful response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}
