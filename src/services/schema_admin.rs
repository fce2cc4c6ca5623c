//! Administrative access to the per-project database engine.
//!
//! Ingestion, replay and the lifecycle manager never open raw connections
//! themselves; they go through [`DatabaseAdmin`] (server-level operations) and
//! [`SchemaSession`] (a connection bound to one schema). Tests provide an
//! in-memory implementation of both traits.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement,
    Value,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

/// Error messages containing any of these fragments are conflicts the replay
/// policy tolerates.
const IGNORABLE_FRAGMENTS: &[&str] = &[
    "already exists",
    "duplicate entry",
    "duplicate key",
    "duplicate column",
];

static SQLSTATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([0-9A-Z]{5})\)").expect("valid regex"));

/// A failure reported by the database engine.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    /// Five character SQLSTATE when the driver reported one
    pub sqlstate: Option<String>,
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let sqlstate = SQLSTATE_RE
            .captures(&message)
            .map(|caps| caps[1].to_string());
        Self { sqlstate, message }
    }

    /// Whether the statement failed only because its effect is already present.
    pub fn is_ignorable(&self) -> bool {
        let lower = self.message.to_lowercase();
        IGNORABLE_FRAGMENTS.iter().any(|f| lower.contains(f))
    }

    /// Whether `CREATE DATABASE` failed because the schema exists.
    pub fn is_schema_collision(&self) -> bool {
        let lower = self.message.to_lowercase();
        lower.contains("database exists") || lower.contains("already exists")
    }
}

impl From<DbErr> for EngineError {
    fn from(err: DbErr) -> Self {
        EngineError::new(err.to_string())
    }
}

/// Column metadata needed by the replay rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub auto_increment: bool,
}

/// Server-level operations on per-project schemas.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn schema_exists(&self, name: &str) -> Result<bool, EngineError>;

    /// Create an empty schema. Fails if it already exists; this is the
    /// authoritative collision check.
    async fn create_schema(&self, name: &str) -> Result<(), EngineError>;

    /// Drop a schema if it exists.
    async fn drop_schema(&self, name: &str) -> Result<(), EngineError>;

    /// Open a session whose default schema is `name`.
    async fn open(&self, name: &str) -> Result<Box<dyn SchemaSession>, EngineError>;
}

/// A single connection bound to one schema. Session variables set through
/// [`SchemaSession::execute`] stay in effect for later calls.
#[async_trait]
pub trait SchemaSession: Send + Sync {
    fn schema(&self) -> &str;

    async fn execute(&self, sql: &str) -> Result<u64, EngineError>;

    async fn table_exists(&self, table: &str) -> Result<bool, EngineError>;

    /// Columns of a table in ordinal order; empty if the table is missing.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError>;

    async fn index_exists(&self, table: &str, index: &str) -> Result<bool, EngineError>;

    async fn is_primary_key_column(&self, table: &str, column: &str) -> Result<bool, EngineError>;

    /// Whether the column takes part in any index of the table.
    async fn is_key_column(&self, table: &str, column: &str) -> Result<bool, EngineError>;

    /// Base tables of the schema, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>, EngineError>;

    async fn has_foreign_keys(&self, table: &str) -> Result<bool, EngineError>;

    /// `CREATE TABLE` statement that recreates the table's structure.
    async fn show_create_table(&self, table: &str) -> Result<String, EngineError>;

    /// Copy every row of `table` from another schema into the same table here.
    async fn copy_rows_from(&self, source_schema: &str, table: &str) -> Result<u64, EngineError>;

    /// Run an integrity check; an error result from the engine becomes `Err`.
    async fn check_table(&self, table: &str) -> Result<(), EngineError>;

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<(), EngineError>;

    /// Replace `old` with `new` inside a text column. Returns affected rows.
    async fn replace_in_column(
        &self,
        table: &str,
        column: &str,
        old: &str,
        new: &str,
    ) -> Result<u64, EngineError>;
}

/// Quote an identifier for MySQL.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Append a schema to a server URL, keeping any query string.
fn schema_url(engine_url: &str, schema: &str) -> String {
    let (base, query) = match engine_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (engine_url, None),
    };
    let mut url = format!("{}/{}", base.trim_end_matches('/'), schema);
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

// ============================================================================
// MySQL implementation
// ============================================================================

/// [`DatabaseAdmin`] backed by a MySQL server.
pub struct MySqlAdmin {
    engine_url: SecretString,
    admin: DatabaseConnection,
}

impl MySqlAdmin {
    /// Connect to the server without selecting a schema.
    pub async fn connect(engine_url: &SecretString) -> Result<Self, EngineError> {
        let mut opts = ConnectOptions::new(engine_url.expose_secret().to_string());
        opts.max_connections(4)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let admin = Database::connect(opts).await?;
        info!("Connected to database engine");

        Ok(Self {
            engine_url: engine_url.clone(),
            admin,
        })
    }
}

#[async_trait]
impl DatabaseAdmin for MySqlAdmin {
    async fn schema_exists(&self, name: &str) -> Result<bool, EngineError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::MySql,
            "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
            [Value::from(name)],
        );
        Ok(self.admin.query_one_raw(stmt).await?.is_some())
    }

    async fn create_schema(&self, name: &str) -> Result<(), EngineError> {
        let sql = format!(
            "CREATE DATABASE {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
            quote_ident(name)
        );
        self.admin.execute_unprepared(&sql).await?;
        info!("Created schema {}", name);
        Ok(())
    }

    async fn drop_schema(&self, name: &str) -> Result<(), EngineError> {
        let sql = format!("DROP DATABASE IF EXISTS {}", quote_ident(name));
        self.admin.execute_unprepared(&sql).await?;
        info!("Dropped schema {}", name);
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<Box<dyn SchemaSession>, EngineError> {
        let url = schema_url(self.engine_url.expose_secret(), name);
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(1)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opts).await?;
        debug!("Opened session on schema {}", name);

        Ok(Box::new(MySqlSession {
            schema: name.to_string(),
            conn,
        }))
    }
}

/// Session on a single pooled connection.
struct MySqlSession {
    schema: String,
    conn: DatabaseConnection,
}

impl MySqlSession {
    async fn any_row(&self, sql: &str, values: Vec<Value>) -> Result<bool, EngineError> {
        let stmt = Statement::from_sql_and_values(DbBackend::MySql, sql, values);
        Ok(self.conn.query_one_raw(stmt).await?.is_some())
    }
}

#[async_trait]
impl SchemaSession for MySqlSession {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn execute(&self, sql: &str) -> Result<u64, EngineError> {
        let result = self.conn.execute_unprepared(sql).await?;
        Ok(result.rows_affected())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, EngineError> {
        self.any_row(
            "SELECT 1 FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
            vec![self.schema.as_str().into(), table.into()],
        )
        .await
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::MySql,
            "SELECT COLUMN_NAME, EXTRA FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
            [self.schema.as_str().into(), table.into()],
        );
        let rows = self.conn.query_all_raw(stmt).await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get_by_index(0)?;
                let extra: String = row.try_get_by_index(1)?;
                Ok(ColumnInfo {
                    name,
                    auto_increment: extra.to_lowercase().contains("auto_increment"),
                })
            })
            .collect::<Result<Vec<_>, DbErr>>()
            .map_err(EngineError::from)
    }

    async fn index_exists(&self, table: &str, index: &str) -> Result<bool, EngineError> {
        self.any_row(
            "SELECT 1 FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME = ? LIMIT 1",
            vec![self.schema.as_str().into(), table.into(), index.into()],
        )
        .await
    }

    async fn is_primary_key_column(&self, table: &str, column: &str) -> Result<bool, EngineError> {
        self.any_row(
            "SELECT 1 FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME = 'PRIMARY' \
             AND COLUMN_NAME = ? LIMIT 1",
            vec![self.schema.as_str().into(), table.into(), column.into()],
        )
        .await
    }

    async fn is_key_column(&self, table: &str, column: &str) -> Result<bool, EngineError> {
        self.any_row(
            "SELECT 1 FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_NAME = ? LIMIT 1",
            vec![self.schema.as_str().into(), table.into(), column.into()],
        )
        .await
    }

    async fn list_tables(&self) -> Result<Vec<String>, EngineError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::MySql,
            "SELECT TABLE_NAME FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
            [self.schema.as_str().into()],
        );
        let rows = self.conn.query_all_raw(stmt).await?;
        rows.iter()
            .map(|row| row.try_get_by_index::<String>(0))
            .collect::<Result<Vec<_>, DbErr>>()
            .map_err(EngineError::from)
    }

    async fn has_foreign_keys(&self, table: &str) -> Result<bool, EngineError> {
        self.any_row(
            "SELECT 1 FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL LIMIT 1",
            vec![self.schema.as_str().into(), table.into()],
        )
        .await
    }

    async fn show_create_table(&self, table: &str) -> Result<String, EngineError> {
        let sql = format!("SHOW CREATE TABLE {}", quote_ident(table));
        let stmt = Statement::from_string(DbBackend::MySql, sql);
        let row = self
            .conn
            .query_one_raw(stmt)
            .await?
            .ok_or_else(|| EngineError::new(format!("Table '{}' doesn't exist", table)))?;
        Ok(row.try_get_by_index::<String>(1)?)
    }

    async fn copy_rows_from(&self, source_schema: &str, table: &str) -> Result<u64, EngineError> {
        let sql = format!(
            "INSERT INTO {}.{} SELECT * FROM {}.{}",
            quote_ident(&self.schema),
            quote_ident(table),
            quote_ident(source_schema),
            quote_ident(table)
        );
        self.execute(&sql).await
    }

    async fn check_table(&self, table: &str) -> Result<(), EngineError> {
        let sql = format!("CHECK TABLE {}", quote_ident(table));
        let rows = self
            .conn
            .query_all_raw(Statement::from_string(DbBackend::MySql, sql))
            .await?;

        for row in rows {
            let msg_type: String = row.try_get_by_index(2)?;
            if msg_type.eq_ignore_ascii_case("error") {
                let text: String = row.try_get_by_index(3)?;
                return Err(EngineError::new(format!(
                    "Integrity check failed for {}: {}",
                    table, text
                )));
            }
        }
        Ok(())
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<(), EngineError> {
        let sql = format!("SET FOREIGN_KEY_CHECKS = {}", if enabled { 1 } else { 0 });
        self.execute(&sql).await.map(|_| ())
    }

    async fn replace_in_column(
        &self,
        table: &str,
        column: &str,
        old: &str,
        new: &str,
    ) -> Result<u64, EngineError> {
        let col = quote_ident(column);
        let sql = format!(
            "UPDATE {} SET {col} = REPLACE({col}, ?, ?) WHERE {col} LIKE ?",
            quote_ident(table),
        );
        let stmt = Statement::from_sql_and_values(
            DbBackend::MySql,
            sql,
            [old.into(), new.into(), format!("%{}%", old).into()],
        );
        let result = self.conn.execute_raw(stmt).await?;
        Ok(result.rows_affected())
    }
}
