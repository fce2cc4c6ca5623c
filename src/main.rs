//! Sitedock server - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sitedock_lib::api::{self, ApiDoc};
use sitedock_lib::auth::{AdminKey, SessionSecret};
use sitedock_lib::config::Config;
use sitedock_lib::db::DbPool;
use sitedock_lib::middleware::RequestLogger;
use sitedock_lib::services::{DatabaseAdmin, MySqlAdmin, ProjectServices, UploadLimit};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

/// Log a startup failure and exit.
fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    // Check for --openapi flag to dump the document and exit
    if std::env::args().any(|arg| arg == "--openapi") {
        match ApiDoc::openapi().to_pretty_json() {
            Ok(spec) => println!("{}", spec),
            Err(e) => {
                eprintln!("Failed to render OpenAPI document: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, SITEDOCK_ENGINE_URL and SITEDOCK_SESSION_SECRET must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Sitedock Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for unset variables");
    }

    // Create storage directories
    for dir in [&config.storage.web_root, &config.storage.scratch_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            fatal(&format!("Failed to create directory {}", dir.display()), e);
        }
    }

    // Catalog database
    let pool = match DbPool::new(&config).await {
        Ok(pool) => pool,
        Err(e) => fatal("Failed to initialize catalog database", e),
    };
    info!("Catalog connection established");

    if let Err(e) = pool.run_migrations().await {
        fatal("Failed to run migrations", e);
    }
    info!("Catalog migrations complete");

    // Engine connection used to create, replay and drop project schemas
    let admin: Arc<dyn DatabaseAdmin> = match MySqlAdmin::connect(&config.engine_url).await {
        Ok(admin) => Arc::new(admin),
        Err(e) => fatal("Failed to connect to the database engine", e),
    };
    info!("Database engine connection established");

    let services = ProjectServices::new(
        pool.clone(),
        admin,
        config.storage.clone(),
        config.deploy_credentials.clone(),
    );

    // Prepare shared state
    let bind_address = config.bind_address();
    let admin_key = AdminKey::new(config.admin_key.clone());
    let session_secret = SessionSecret::new(config.session_secret.clone());
    let upload_limit = UploadLimit(config.max_upload_size);
    let web_root = config.storage.web_root.clone();
    let public_base_path = config.storage.public_base_path.clone();
    let is_development = config.is_development();

    info!(
        "Upload limit: {}MB per archive, web root {:?} served at '{}'",
        config.max_upload_size / 1024 / 1024,
        web_root,
        public_base_path
    );

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };
    info!("Swagger UI available at http://{}/swagger-ui/", bind_address);

    let services = web::Data::new(services);
    let openapi = ApiDoc::openapi();

    // Start HTTP server
    let server = HttpServer::new(move || {
        let allowed_headers = vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-admin-key"),
        ];

        // Configure CORS
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        };

        let mut app = App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            .wrap(RequestLogger)
            // Add shared state
            .app_data(web::Data::new(pool.clone()))
            .app_data(services.clone())
            .app_data(web::Data::new(admin_key.clone()))
            .app_data(web::Data::new(session_secret.clone()))
            .app_data(web::Data::new(upload_limit))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .service(web::scope("/api/v1").configure(api::configure_api_routes))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            );

        // Deployed projects are served from the web root
        if !public_base_path.is_empty() {
            app = app.service(
                Files::new(&public_base_path, web_root.clone())
                    .index_file("index.html")
                    .prefer_utf8(true),
            );
        }

        app
    });

    // Set worker count
    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
