//! API endpoint modules.

pub mod admin;
pub mod health;
pub mod openapi;
pub mod projects;

use actix_web::web;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;

/// Register every `/api/v1` route.
///
/// `/projects/upload` goes before `/projects/{project_id}` so the upload
/// POST is not answered with 405 by the detail resource.
pub fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health_routes)
        .configure(crate::services::configure_upload_routes)
        .configure(projects::configure_routes)
        .configure(admin::configure_routes);
}
