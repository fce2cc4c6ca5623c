//! Project upload endpoint: multipart intake feeding the ingestion pipeline.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::RequestContext;
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, IngestionData};
use crate::services::{IngestionRequest, ProjectServices};

/// Field carrying the archive.
const ARCHIVE_FIELD: &str = "archive";

/// Maximum text field size (name, database name, description).
const MAX_TEXT_FIELD: usize = 64 * 1024;

/// Upper bound on an uploaded archive, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

/// Multipart form accepted by the upload endpoint.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadProjectForm {
    /// Zip archive with the project files and SQL dumps
    #[schema(value_type = String, format = Binary)]
    archive: Vec<u8>,
    /// Display name; the URL slug is derived from it
    name: String,
    /// Name of the database to create (`^[A-Za-z0-9_]+$`)
    database_name: String,
    description: Option<String>,
}

/// Configure upload routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/projects/upload").route(web::post().to(upload_project)));
}

/// Upload and deploy a project.
///
/// The owning caller receives the full per-file replay error list.
#[utoipa::path(
    post,
    path = "/api/v1/projects/upload",
    tag = "Projects",
    request_body(content = UploadProjectForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Project processed; status tells whether replay was clean", body = IngestionData),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 409, description = "Slug or database name taken", body = crate::error::ErrorResponse),
        (status = 413, description = "Archive too large", body = crate::error::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn upload_project(
    ctx: RequestContext,
    mut payload: Multipart,
    services: web::Data<ProjectServices>,
    limit: web::Data<UploadLimit>,
) -> AppResult<HttpResponse> {
    tokio::fs::create_dir_all(&services.storage.scratch_dir)
        .await
        .map_err(|e| AppError::FileSystem(format!("Failed to create scratch directory: {}", e)))?;

    let mut archive: Option<NamedTempFile> = None;
    let mut name: Option<String> = None;
    let mut database_name: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("Missing content disposition".to_string()))?;

        if field_name == ARCHIVE_FIELD {
            let staged = NamedTempFile::new_in(&services.storage.scratch_dir)
                .map_err(|e| AppError::FileSystem(format!("Failed to stage upload: {}", e)))?;
            let handle = staged
                .reopen()
                .map_err(|e| AppError::FileSystem(format!("Failed to stage upload: {}", e)))?;
            let mut file = tokio::fs::File::from_std(handle);

            let mut size = 0usize;
            while let Some(chunk) = field.next().await {
                let data =
                    chunk.map_err(|e| AppError::Validation(format!("Read error: {}", e)))?;
                size += data.len();
                if size > limit.0 {
                    return Err(AppError::PayloadTooLarge(format!(
                        "Archive exceeds maximum size of {} bytes",
                        limit.0
                    )));
                }
                file.write_all(&data)
                    .await
                    .map_err(|e| AppError::FileSystem(format!("Failed to write upload: {}", e)))?;
            }
            file.flush()
                .await
                .map_err(|e| AppError::FileSystem(format!("Failed to write upload: {}", e)))?;

            if size == 0 {
                return Err(AppError::Validation("Uploaded archive is empty".to_string()));
            }
            info!("Received archive of {} bytes from user {}", size, ctx.user_id);
            archive = Some(staged);
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::Validation(format!("Read error: {}", e)))?;
            if data.len() + chunk.len() > MAX_TEXT_FIELD {
                return Err(AppError::Validation(format!("Field '{}' is too large", field_name)));
            }
            data.extend_from_slice(&chunk);
        }
        let value = String::from_utf8(data)
            .map_err(|_| AppError::Validation(format!("Field '{}' is not valid UTF-8", field_name)))?;

        match field_name.as_str() {
            "name" => name = Some(value),
            "database_name" => database_name = Some(value.trim().to_string()),
            "description" => description = Some(value),
            other => info!("Ignoring unknown upload field '{}'", other),
        }
    }

    let (Some(archive), Some(name), Some(database_name)) = (archive, name, database_name) else {
        return Err(AppError::Validation(
            "Missing required fields: archive, name, or database_name".to_string(),
        ));
    };

    let outcome = services
        .ingest(IngestionRequest {
            user_id: ctx.user_id,
            name,
            database_name,
            description,
            archive: archive.path().to_path_buf(),
        })
        .await?;

    // The staged archive is removed when `archive` drops.
    drop(archive);

    Ok(HttpResponse::Created().json(ApiResponse::ok(
        "Project processed successfully",
        outcome.data(),
    )))
}
