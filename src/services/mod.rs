//! Ingestion and lifecycle services.

pub mod archive;
pub mod config_rewriter;
pub mod deployment;
pub mod fs_ops;
pub mod ingestion;
pub mod lifecycle;
pub mod locks;
pub mod schema_admin;
pub mod sql_replay;
pub mod upload;

use std::sync::Arc;

use crate::config::{DeployCredentials, StorageSettings};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

pub use ingestion::{IngestionOutcome, IngestionRequest};
pub use locks::OperationLocks;
pub use schema_admin::{DatabaseAdmin, EngineError, MySqlAdmin, SchemaSession};
pub use upload::{UploadLimit, configure_routes as configure_upload_routes};

/// Everything the project pipeline needs, shared by the HTTP handlers.
#[derive(Clone)]
pub struct ProjectServices {
    pub pool: DbPool,
    pub admin: Arc<dyn DatabaseAdmin>,
    pub locks: OperationLocks,
    pub storage: StorageSettings,
    pub credentials: DeployCredentials,
}

impl ProjectServices {
    pub fn new(
        pool: DbPool,
        admin: Arc<dyn DatabaseAdmin>,
        storage: StorageSettings,
        credentials: DeployCredentials,
    ) -> Self {
        Self {
            pool,
            admin,
            locks: OperationLocks::new(),
            storage,
            credentials,
        }
    }
}

/// Run blocking filesystem work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::FileSystem(format!("Blocking task failed: {}", e)))?
}
