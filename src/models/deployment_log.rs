//! Deployment log DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::deployment_log;

/// Log message written when replay reported no errors.
pub const DEPLOY_SUCCESS_MESSAGE: &str = "Project deployed successfully";

/// One deployment log row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeploymentLogResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub log_message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<deployment_log::Model> for DeploymentLogResponse {
    fn from(m: deployment_log::Model) -> Self {
        Self {
            id: m.id,
            project_id: m.project_id,
            log_message: m.log_message,
            timestamp: m.timestamp,
        }
    }
}

/// Admin log view entry including the owning project's name.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminLogEntry {
    #[serde(flatten)]
    pub log: DeploymentLogResponse,
    pub project_name: Option<String>,
}
