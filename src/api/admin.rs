//! Admin endpoints, guarded by the admin key.

use actix_web::{HttpResponse, web};
use tracing::info;
use uuid::Uuid;

use crate::auth::AdminAuth;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{AdminLogEntry, ApiResponse, ProjectResponse};
use crate::services::ProjectServices;

/// All projects of all users.
#[utoipa::path(
    get,
    path = "/api/v1/admin/projects",
    tag = "Admin",
    responses(
        (status = 200, description = "All projects, newest first", body = Vec<ProjectResponse>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn list_all_projects(_auth: AdminAuth, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let projects: Vec<ProjectResponse> = pool
        .list_all_projects()
        .await?
        .into_iter()
        .map(ProjectResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        format!("{} project(s)", projects.len()),
        projects,
    )))
}

/// Delete any project. Same best-effort cleanup as the owner delete.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/projects/{project_id}",
    tag = "Admin",
    params(
        ("project_id" = Uuid, Path, description = "Project UUID")
    ),
    responses(
        (status = 200, description = "Project deleted"),
        (status = 404, description = "Project not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn admin_delete_project(
    _auth: AdminAuth,
    path: web::Path<Uuid>,
    services: web::Data<ProjectServices>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    services.delete(project_id, None).await?;

    info!("Admin deleted project {}", project_id);
    Ok(HttpResponse::Ok().json(ApiResponse::message("Project deleted successfully")))
}

/// Every deployment log with its project name, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/admin/logs",
    tag = "Admin",
    responses(
        (status = 200, description = "Deployment logs", body = Vec<AdminLogEntry>),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn list_logs(_auth: AdminAuth, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let logs: Vec<AdminLogEntry> = pool
        .list_all_logs()
        .await?
        .into_iter()
        .map(|(log, project_name)| AdminLogEntry {
            log: log.into(),
            project_name,
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(format!("{} log(s)", logs.len()), logs)))
}

/// Configure admin routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/admin/projects").route(web::get().to(list_all_projects)))
        .service(
            web::resource("/admin/projects/{project_id}")
                .route(web::delete().to(admin_delete_project)),
        )
        .service(web::resource("/admin/logs").route(web::get().to(list_logs)));
}
