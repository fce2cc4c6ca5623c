//! Owner-facing project endpoints: listing, detail, rename and delete.

use actix_web::{HttpResponse, web};
use tracing::info;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{
    ApiResponse, DeploymentLogResponse, ProjectDetailResponse, ProjectResponse, ProjectSummary,
    PublicProject, UpdateProjectRequest,
};
use crate::services::ProjectServices;

/// List the caller's projects with their latest deployment log line.
#[utoipa::path(
    get,
    path = "/api/v1/projects",
    tag = "Projects",
    responses(
        (status = 200, description = "Caller's projects, newest first", body = Vec<ProjectSummary>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn list_projects(ctx: RequestContext, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let projects: Vec<ProjectSummary> = pool
        .list_projects_for_user(ctx.user_id)
        .await?
        .into_iter()
        .map(|(project, latest_log)| ProjectSummary {
            project: project.into(),
            latest_log,
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        format!("{} project(s)", projects.len()),
        projects,
    )))
}

/// Deployed projects visible to everyone.
#[utoipa::path(
    get,
    path = "/api/v1/projects/public",
    tag = "Projects",
    responses(
        (status = 200, description = "Deployed projects with a URL", body = Vec<PublicProject>),
    )
)]
pub async fn list_public_projects(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let projects: Vec<PublicProject> = pool
        .list_public_projects()
        .await?
        .into_iter()
        .map(PublicProject::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        format!("{} project(s)", projects.len()),
        projects,
    )))
}

/// Project detail with its deployment logs.
#[utoipa::path(
    get,
    path = "/api/v1/projects/{project_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project UUID")
    ),
    responses(
        (status = 200, description = "Project detail", body = ProjectDetailResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn get_project(
    ctx: RequestContext,
    path: web::Path<Uuid>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    let project = pool.get_owned_project(project_id, ctx.user_id).await?;
    let logs = pool
        .get_project_logs(project_id)
        .await?
        .into_iter()
        .map(DeploymentLogResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Project retrieved",
        ProjectDetailResponse {
            project: project.into(),
            logs,
        },
    )))
}

/// Rename a project or change its description or database name.
#[utoipa::path(
    put,
    path = "/api/v1/projects/{project_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project UUID")
    ),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Updated project", body = ProjectResponse),
        (status = 400, description = "Nothing to change or invalid input", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 409, description = "New slug or database name taken", body = crate::error::ErrorResponse),
        (status = 500, description = "Rename failed; the original project is unchanged", body = crate::error::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn update_project(
    ctx: RequestContext,
    path: web::Path<Uuid>,
    body: web::Json<UpdateProjectRequest>,
    services: web::Data<ProjectServices>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    let updated = services
        .rename(ctx.user_id, project_id, body.into_inner())
        .await?;

    info!("User {} updated project {}", ctx.user_id, project_id);
    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Project updated successfully",
        ProjectResponse::from(updated),
    )))
}

/// Delete a project, its folder and its database.
#[utoipa::path(
    delete,
    path = "/api/v1/projects/{project_id}",
    tag = "Projects",
    params(
        ("project_id" = Uuid, Path, description = "Project UUID")
    ),
    responses(
        (status = 200, description = "Project deleted"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn delete_project(
    ctx: RequestContext,
    path: web::Path<Uuid>,
    services: web::Data<ProjectServices>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    services.delete(project_id, Some(ctx.user_id)).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::message("Project deleted successfully")))
}

/// Configure project routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/projects").route(web::get().to(list_projects)))
        .service(web::resource("/projects/public").route(web::get().to(list_public_projects)))
        .service(
            web::resource("/projects/{project_id}")
                .route(web::get().to(get_project))
                .route(web::put().to(update_project))
                .route(web::delete().to(delete_project)),
        );
}
