//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models, services};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sitedock Server",
        version = "0.3.0",
        description = "Uploads zipped web projects, provisions a database per project from bundled SQL dumps and deploys the files to a public web root"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Project endpoints
        services::upload::upload_project,
        api::projects::list_projects,
        api::projects::list_public_projects,
        api::projects::get_project,
        api::projects::update_project,
        api::projects::delete_project,
        // Admin endpoints
        api::admin::list_all_projects,
        api::admin::admin_delete_project,
        api::admin::list_logs,
    ),
    components(
        schemas(
            error::ErrorResponse,
            api::health::HealthResponse,
            api::health::ReadyResponse,
            models::ProjectStatus,
            models::ProjectResponse,
            models::ProjectSummary,
            models::PublicProject,
            models::ProjectDetailResponse,
            models::UpdateProjectRequest,
            models::IngestionData,
            models::DeploymentLogResponse,
            models::AdminLogEntry,
            services::upload::UploadProjectForm,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Projects", description = "Project upload, listing, rename and delete"),
        (name = "Admin", description = "Administration across all users")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Register the session and admin key security schemes.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};

        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::config::ADMIN_KEY_HEADER,
                ))),
            );
        }
    }
}
