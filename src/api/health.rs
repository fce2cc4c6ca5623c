//! Liveness and readiness probes.
//!
//! `/ready` only answers 200 when both places a deployment writes to are
//! usable: the catalog database and the public web root.

use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::services::ProjectServices;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

/// Per-dependency readiness.
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    status: &'static str,
    catalog: bool,
    web_root: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Process is up", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Catalog and web root are usable", body = ReadyResponse),
        (status = 503, description = "A dependency is unavailable", body = ReadyResponse)
    )
)]
#[get("/ready")]
pub async fn ready(pool: web::Data<DbPool>, services: web::Data<ProjectServices>) -> HttpResponse {
    let conn = pool.connection();
    let ping = Statement::from_string(conn.get_database_backend(), "SELECT 1".to_owned());
    let catalog = conn.query_one_raw(ping).await.is_ok();
    let web_root = services.storage.web_root.is_dir();

    if catalog && web_root {
        HttpResponse::Ok().json(ReadyResponse {
            status: "ready",
            catalog,
            web_root,
        })
    } else {
        tracing::warn!(catalog, web_root, "Readiness check failed");
        HttpResponse::ServiceUnavailable().json(ReadyResponse {
            status: "unavailable",
            catalog,
            web_root,
        })
    }
}

pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
