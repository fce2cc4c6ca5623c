//! Defensive replay of SQL dump files into a freshly created schema.
//!
//! Dumps come from arbitrary projects and are often not idempotent or were
//! produced by a different engine version. Every statement passes through a
//! set of skip rules first; engine errors that only say "this already exists"
//! are swallowed, any other error stops the current file and is recorded,
//! and the next file still runs.

mod splitter;
mod statement;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::services::schema_admin::{EngineError, SchemaSession};

pub use splitter::{preview, split_statements};
pub use statement::{AddTarget, ForeignKeyRef, ParsedStatement, StatementKind};

/// Extension of dump files picked up from an extracted tree.
const SQL_EXTENSION: &str = "sql";

/// A replay problem recorded against one file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read SQL file: {file}: {reason}")]
    Read { file: String, reason: String },

    #[error("Failed to execute SQL file: {file}: {reason}")]
    Execute { file: String, reason: String },

    /// An INSERT was dropped because its table or columns are missing
    #[error("Skipped statement in SQL file {file}: {reason}")]
    SkippedInsert { file: String, reason: String },
}

/// Result of replaying one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: String,
    pub executed: usize,
    pub skipped: usize,
    pub errors: Vec<ReplayError>,
}

impl FileOutcome {
    fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            executed: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregate result of a replay run.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub files: Vec<FileOutcome>,
}

impl ReplayReport {
    /// Every recorded error, in file order.
    pub fn error_messages(&self) -> Vec<String> {
        self.files
            .iter()
            .flat_map(|f| f.errors.iter().map(ToString::to_string))
            .collect()
    }

    /// Files that replayed without any recorded error.
    pub fn successful_files(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| f.is_clean())
            .map(|f| f.file.clone())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.files.iter().all(FileOutcome::is_clean)
    }
}

/// What the rules decided for one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Execute,
    /// Skip silently (only logged)
    Skip(String),
    /// Skip and record, because data would be lost
    SkipRecorded(String),
}

/// Find every dump file under `root`, sorted by relative path.
///
/// Lexicographic order is the execution order.
pub fn find_sql_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(SQL_EXTENSION))
            {
                found.push(path);
            }
        }
    }

    found.sort_by(|a, b| relative_name(root, a).cmp(&relative_name(root, b)));
    Ok(found)
}

/// Path of `file` relative to `root`, with forward slashes.
pub fn relative_name(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Replay every dump file under `root` into the session's schema.
pub async fn replay_tree(session: &dyn SchemaSession, root: &Path) -> ReplayReport {
    let mut report = ReplayReport::default();

    let root_buf = root.to_path_buf();
    let files = match tokio::task::spawn_blocking(move || find_sql_files(&root_buf)).await {
        Ok(Ok(files)) => files,
        Ok(Err(e)) => {
            warn!("Failed to scan for SQL files: {}", e);
            report.files.push(FileOutcome {
                errors: vec![ReplayError::Read {
                    file: ".".to_string(),
                    reason: e.to_string(),
                }],
                ..FileOutcome::new(".")
            });
            return report;
        }
        Err(e) => {
            warn!("SQL file scan task failed: {}", e);
            return report;
        }
    };

    info!(
        "Replaying {} SQL file(s) into schema {}",
        files.len(),
        session.schema()
    );

    for path in files {
        let name = relative_name(root, &path);
        let outcome = match tokio::fs::read(&path).await {
            Ok(bytes) => replay_file(session, &name, &String::from_utf8_lossy(&bytes)).await,
            Err(e) => {
                let mut outcome = FileOutcome::new(&name);
                outcome.errors.push(ReplayError::Read {
                    file: name.clone(),
                    reason: e.to_string(),
                });
                outcome
            }
        };
        report.files.push(outcome);
    }

    report
}

/// Replay the statements of one file.
pub async fn replay_file(session: &dyn SchemaSession, file: &str, sql: &str) -> FileOutcome {
    let mut outcome = FileOutcome::new(file);
    info!("Processing SQL file: {}", file);

    for raw in split_statements(sql) {
        let stmt = ParsedStatement::parse(&raw);

        let decision = match decide(session, &stmt).await {
            Ok(decision) => decision,
            Err(e) => {
                error_stop(&mut outcome, file, &stmt, e);
                break;
            }
        };

        match decision {
            Decision::Skip(reason) => {
                debug!("Skipping statement ({}): {}", reason, preview(&stmt.sql));
                outcome.skipped += 1;
                continue;
            }
            Decision::SkipRecorded(reason) => {
                warn!("Skipping statement in {} ({}): {}", file, reason, preview(&stmt.sql));
                outcome.skipped += 1;
                outcome.errors.push(ReplayError::SkippedInsert {
                    file: file.to_string(),
                    reason: format!("{} [{}]", reason, preview(&stmt.sql)),
                });
                continue;
            }
            Decision::Execute => {}
        }

        debug!("Executing statement: {}", preview(&stmt.sql));
        match session.execute(&stmt.sql).await {
            Ok(_) => outcome.executed += 1,
            Err(e) if e.is_ignorable() => {
                debug!("Ignorable error, continuing: {}", e);
                outcome.skipped += 1;
            }
            Err(e) => {
                error_stop(&mut outcome, file, &stmt, e);
                break;
            }
        }
    }

    info!(
        "Finished SQL file {}: {} executed, {} skipped, {} error(s)",
        file,
        outcome.executed,
        outcome.skipped,
        outcome.errors.len()
    );
    outcome
}

fn error_stop(outcome: &mut FileOutcome, file: &str, stmt: &ParsedStatement, err: EngineError) {
    warn!(
        "SQL error in file {} (sqlstate {}): {} [{}]",
        file,
        err.sqlstate.as_deref().unwrap_or("-"),
        err.message,
        preview(&stmt.sql)
    );
    outcome.errors.push(ReplayError::Execute {
        file: file.to_string(),
        reason: err.message,
    });
}

/// Apply the skip rules to one statement.
///
/// May run a corrective `ADD PRIMARY KEY` before an auto-increment modify.
async fn decide(session: &dyn SchemaSession, stmt: &ParsedStatement) -> Result<Decision, EngineError> {
    match &stmt.kind {
        StatementKind::SessionPragma => return Ok(Decision::Skip("session pragma".to_string())),

        StatementKind::CreateTable { table } => {
            if session.table_exists(table).await? {
                return Ok(Decision::Skip(format!("table {} already exists", table)));
            }
        }

        StatementKind::Insert { table, columns } => {
            let existing = session.columns(table).await?;
            if existing.is_empty() {
                return Ok(Decision::SkipRecorded(format!(
                    "INSERT INTO {} skipped: table does not exist",
                    table
                )));
            }
            if let Some(missing) = columns
                .iter()
                .find(|c| !existing.iter().any(|e| e.name.eq_ignore_ascii_case(c)))
            {
                return Ok(Decision::SkipRecorded(format!(
                    "INSERT INTO {} skipped: column {} does not exist",
                    table, missing
                )));
            }
        }

        StatementKind::AlterTable {
            table,
            auto_increment_column,
            adds,
        } => {
            if !session.table_exists(table).await? {
                return Ok(Decision::Skip(format!("table {} does not exist", table)));
            }

            if let Some(column) = auto_increment_column {
                let columns = session.columns(table).await?;
                if columns
                    .iter()
                    .any(|c| c.name.eq_ignore_ascii_case(column) && c.auto_increment)
                {
                    return Ok(Decision::Skip(format!(
                        "{}.{} is already auto-increment",
                        table, column
                    )));
                }
                ensure_primary_key(session, table, column).await?;
            }

            if !adds.is_empty() && all_targets_exist(session, table, adds).await? {
                return Ok(Decision::Skip(format!(
                    "everything added to {} already exists",
                    table
                )));
            }
        }

        StatementKind::Other => {}
    }

    for fk in &stmt.foreign_keys {
        // A table referencing itself is created by this very statement.
        if stmt.own_table() == Some(fk.table.as_str())
            && matches!(stmt.kind, StatementKind::CreateTable { .. })
        {
            continue;
        }
        if !session.table_exists(&fk.table).await? {
            return Ok(Decision::Skip(format!(
                "referenced table {} does not exist",
                fk.table
            )));
        }
        if !session.is_key_column(&fk.table, &fk.column).await? {
            return Ok(Decision::Skip(format!(
                "referenced column {}.{} is not a key",
                fk.table, fk.column
            )));
        }
    }

    Ok(Decision::Execute)
}

/// Auto-increment requires a key; add a primary key on the column when missing.
async fn ensure_primary_key(
    session: &dyn SchemaSession,
    table: &str,
    column: &str,
) -> Result<(), EngineError> {
    if session.is_primary_key_column(table, column).await? {
        return Ok(());
    }

    let sql = format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({})",
        crate::services::schema_admin::quote_ident(table),
        crate::services::schema_admin::quote_ident(column)
    );
    match session.execute(&sql).await {
        Ok(_) => {
            info!("Added primary key on {}.{}", table, column);
            Ok(())
        }
        Err(e) if e.is_ignorable() || e.message.to_lowercase().contains("multiple primary key") => {
            debug!("Primary key on {} already present: {}", table, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn all_targets_exist(
    session: &dyn SchemaSession,
    table: &str,
    targets: &[AddTarget],
) -> Result<bool, EngineError> {
    let mut columns = None;
    for target in targets {
        let exists = match target {
            AddTarget::Index(name) => session.index_exists(table, name).await?,
            AddTarget::Column(name) => {
                if columns.is_none() {
                    columns = Some(session.columns(table).await?);
                }
                columns
                    .as_ref()
                    .is_some_and(|cols| cols.iter().any(|c| c.name.eq_ignore_ascii_case(name)))
            }
        };
        if !exists {
            return Ok(false);
        }
    }
    Ok(true)
}
