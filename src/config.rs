//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

/// HTTP header name for admin key.
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Issuer claim expected on session tokens.
pub const SESSION_ISSUER: &str = "sitedock";

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = "mysql://root:@localhost:3306/project_repo";
    pub const DEV_ENGINE_URL: &str = "mysql://root:@localhost:3306";
    pub const DEV_SESSION_SECRET: &str = "dev-session-secret-do-not-use-in-production";
    pub const DEV_ADMIN_KEY: &str = "dev-admin-key-do-not-use-in-production";
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const DEV_WEB_ROOT: &str = "./data/projects";
    pub const DEV_SCRATCH_DIR: &str = "./data/scratch";
    pub const DEV_PUBLIC_BASE_PATH: &str = "/projects";
    pub const DEV_MAX_UPLOAD_SIZE: usize = 209_715_200; // 200MB per archive

    // Credentials written into rewritten project config files
    pub const DEV_DEPLOY_DB_HOST: &str = "localhost";
    pub const DEV_DEPLOY_DB_USER: &str = "root";
    pub const DEV_DEPLOY_DB_PASSWORD: &str = "";
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Credentials patched into deployed project configuration files.
#[derive(Debug, Clone)]
pub struct DeployCredentials {
    pub host: String,
    pub username: String,
    pub password: SecretString,
}

impl DeployCredentials {
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Filesystem layout for ingestion and deployment.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Public serving root; one directory per project slug
    pub web_root: PathBuf,
    /// Parent directory for request-scoped scratch trees
    pub scratch_dir: PathBuf,
    /// URL prefix the web root is served under (no trailing slash)
    pub public_base_path: String,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Catalog database URL (MySQL connection string)
    pub database_url: String,
    /// Administrative engine URL without a schema
    pub engine_url: SecretString,
    /// Secret used to verify session tokens
    pub session_secret: SecretString,
    /// Admin key for the admin surface
    pub admin_key: Option<String>,
    /// Maximum archive size in bytes
    pub max_upload_size: usize,
    /// Web root and scratch layout
    pub storage: StorageSettings,
    /// Credentials for rewritten project configs
    pub deploy_credentials: DeployCredentials,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development) every variable has a default.
    /// In production mode the catalog URL, session secret and admin key must
    /// not match the development defaults.
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `SITEDOCK_HOST` / `SITEDOCK_PORT`: bind address
    /// - `DATABASE_URL`: catalog connection string
    /// - `SITEDOCK_ENGINE_URL`: engine URL used for per-project schemas
    /// - `SITEDOCK_WEB_ROOT`: public serving root
    /// - `SITEDOCK_SCRATCH_DIR`: scratch extraction parent directory
    /// - `SITEDOCK_PUBLIC_BASE_PATH`: URL prefix of the web root
    /// - `SITEDOCK_MAX_UPLOAD_SIZE`: max archive size in bytes
    /// - `SITEDOCK_SESSION_SECRET`: HS256 secret for session tokens
    /// - `SITEDOCK_ADMIN_KEY`: admin key (optional in production)
    /// - `SITEDOCK_DEPLOY_DB_HOST` / `_USER` / `_PASSWORD`: credentials written into project configs
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let host = env::var("SITEDOCK_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("SITEDOCK_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("SITEDOCK_PORT must be a valid port number"))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string());

        let engine_url = env::var("SITEDOCK_ENGINE_URL")
            .unwrap_or_else(|_| defaults::DEV_ENGINE_URL.to_string());

        let session_secret = env::var("SITEDOCK_SESSION_SECRET")
            .unwrap_or_else(|_| defaults::DEV_SESSION_SECRET.to_string());

        let admin_key = if environment.is_development() {
            Some(
                env::var("SITEDOCK_ADMIN_KEY")
                    .unwrap_or_else(|_| defaults::DEV_ADMIN_KEY.to_string()),
            )
        } else {
            env::var("SITEDOCK_ADMIN_KEY").ok()
        };

        let max_upload_size = env::var("SITEDOCK_MAX_UPLOAD_SIZE")
            .unwrap_or_else(|_| defaults::DEV_MAX_UPLOAD_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::InvalidValue("SITEDOCK_MAX_UPLOAD_SIZE must be a valid number")
            })?;

        let public_base_path = normalize_base_path(
            &env::var("SITEDOCK_PUBLIC_BASE_PATH")
                .unwrap_or_else(|_| defaults::DEV_PUBLIC_BASE_PATH.to_string()),
        );

        let storage = StorageSettings {
            web_root: PathBuf::from(
                env::var("SITEDOCK_WEB_ROOT").unwrap_or_else(|_| defaults::DEV_WEB_ROOT.to_string()),
            ),
            scratch_dir: PathBuf::from(
                env::var("SITEDOCK_SCRATCH_DIR")
                    .unwrap_or_else(|_| defaults::DEV_SCRATCH_DIR.to_string()),
            ),
            public_base_path,
        };

        let deploy_credentials = DeployCredentials {
            host: env::var("SITEDOCK_DEPLOY_DB_HOST")
                .unwrap_or_else(|_| defaults::DEV_DEPLOY_DB_HOST.to_string()),
            username: env::var("SITEDOCK_DEPLOY_DB_USER")
                .unwrap_or_else(|_| defaults::DEV_DEPLOY_DB_USER.to_string()),
            password: SecretString::from(
                env::var("SITEDOCK_DEPLOY_DB_PASSWORD")
                    .unwrap_or_else(|_| defaults::DEV_DEPLOY_DB_PASSWORD.to_string()),
            ),
        };

        let config = Config {
            environment,
            host,
            port,
            database_url,
            engine_url: SecretString::from(engine_url),
            session_secret: SecretString::from(session_secret),
            admin_key,
            max_upload_size,
            storage,
            deploy_credentials,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.database_url == defaults::DEV_DATABASE_URL {
            errors.push(format!(
                "DATABASE_URL is using development default '{}'. Set a production MySQL URL.",
                defaults::DEV_DATABASE_URL
            ));
        }

        if self.session_secret.expose_secret() == defaults::DEV_SESSION_SECRET {
            errors.push(
                "SITEDOCK_SESSION_SECRET is using development default. Set a secure secret."
                    .to_string(),
            );
        }

        if let Some(ref key) = self.admin_key
            && key == defaults::DEV_ADMIN_KEY
        {
            errors.push(
                "SITEDOCK_ADMIN_KEY is using development default. Set a secure admin key or remove it."
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

/// Ensure a leading slash and strip trailing ones ("projects/" -> "/projects").
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
