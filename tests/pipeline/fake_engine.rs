//! Scripted in-memory database engine.
//!
//! Understands the handful of MySQL statements the dumps in these tests use
//! (CREATE TABLE, INSERT, ALTER TABLE ADD/MODIFY, DROP TABLE) and reports
//! errors with the same wording MySQL uses, so the replay policy sees the
//! messages it classifies in production. Failures can be injected per
//! statement fragment, per copied table and for schema drops.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use async_trait::async_trait;
use regex::Regex;
use sitedock_lib::services::schema_admin::ColumnInfo;
use sitedock_lib::services::{DatabaseAdmin, EngineError, SchemaSession};

static LEADING_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?s)\s*/\*.*?\*/\s*").unwrap());
static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^CREATE\s+TABLE(?:\s+IF\s+NOT\s+EXISTS)?\s+`?(\w+)`?\s*\((.*)\)[^)]*$")
        .unwrap()
});
static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^INSERT\s+(?:IGNORE\s+)?INTO\s+`?(\w+)`?\s*(?:\(([^)]*)\))?\s*VALUES\s*(.*)$")
        .unwrap()
});
static ALTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^ALTER\s+TABLE\s+`?(\w+)`?\s+(.*)$").unwrap());
static DROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^DROP\s+TABLE(?:\s+IF\s+EXISTS)?\s+`?(\w+)`?").unwrap()
});
static PAREN_COLS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]*)\)").unwrap());
static INDEX_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:UNIQUE\s+|FULLTEXT\s+)?(?:KEY|INDEX)\s+`?(\w+)`?\s*\(([^)]*)\)").unwrap()
});
static FK_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)FOREIGN\s+KEY\s*(?:`?\w+`?\s*)?\(\s*`?(\w+)`?\s*\)\s*REFERENCES\s+`?(\w+)`?\s*\(\s*`?(\w+)`?")
        .unwrap()
});
static MODIFY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^MODIFY\s+(?:COLUMN\s+)?`?(\w+)`?").unwrap());
static ADD_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^ADD\s+(?:COLUMN\s+)?`?(\w+)`?").unwrap());

#[derive(Debug, Clone, Default)]
struct FakeTable {
    columns: Vec<ColumnInfo>,
    primary: Vec<String>,
    indexes: BTreeMap<String, Vec<String>>,
    foreign_keys: Vec<(String, String, String)>,
    rows: Vec<String>,
}

impl FakeTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn is_key_column(&self, name: &str) -> bool {
        self.primary.iter().any(|c| c.eq_ignore_ascii_case(name))
            || self
                .indexes
                .values()
                .any(|cols| cols.iter().any(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Render the structure back as DDL, like SHOW CREATE TABLE.
    fn ddl(&self, name: &str) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.auto_increment {
                    format!("  `{}` int NOT NULL AUTO_INCREMENT", c.name)
                } else {
                    format!("  `{}` text", c.name)
                }
            })
            .collect();
        if !self.primary.is_empty() {
            parts.push(format!("  PRIMARY KEY ({})", quote_list(&self.primary)));
        }
        for (index, cols) in &self.indexes {
            parts.push(format!("  KEY `{}` ({})", index, quote_list(cols)));
        }
        for (col, ref_table, ref_col) in &self.foreign_keys {
            parts.push(format!(
                "  FOREIGN KEY (`{}`) REFERENCES `{}` (`{}`)",
                col, ref_table, ref_col
            ));
        }
        format!("CREATE TABLE `{}` (\n{}\n) ENGINE=InnoDB", name, parts.join(",\n"))
    }
}

fn quote_list(cols: &[String]) -> String {
    cols.iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(",")
}

fn strip_ident(s: &str) -> String {
    s.trim().trim_matches('`').to_string()
}

fn ident_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(strip_ident)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in body.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' => {
                    depth -= 1;
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

type Schema = BTreeMap<String, FakeTable>;

#[derive(Debug, Default)]
struct EngineState {
    schemas: BTreeMap<String, Schema>,
    failing_fragments: Vec<String>,
    failing_copies: Vec<String>,
    fail_drops: bool,
    statements: Vec<(String, String)>,
}

/// Shared handle to the in-memory engine; clones see the same state.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    /// Fail any statement containing `fragment` with a syntax error.
    pub fn fail_statements_containing(&self, fragment: &str) {
        self.lock().failing_fragments.push(fragment.to_string());
    }

    /// Fail the row copy of `table` during a schema copy.
    pub fn fail_copy_of(&self, table: &str) {
        self.lock().failing_copies.push(table.to_string());
    }

    pub fn fail_drops(&self) {
        self.lock().fail_drops = true;
    }

    /// Create a schema directly, bypassing the admin trait.
    pub fn seed_schema(&self, name: &str) {
        self.lock().schemas.entry(name.to_string()).or_default();
    }

    pub fn schema_names(&self) -> Vec<String> {
        self.lock().schemas.keys().cloned().collect()
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.lock().schemas.contains_key(name)
    }

    pub fn table_names(&self, schema: &str) -> Vec<String> {
        self.lock()
            .schemas
            .get(schema)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rows(&self, schema: &str, table: &str) -> Vec<String> {
        self.lock()
            .schemas
            .get(schema)
            .and_then(|s| s.get(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn column_names(&self, schema: &str, table: &str) -> Vec<String> {
        self.lock()
            .schemas
            .get(schema)
            .and_then(|s| s.get(table))
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_auto_increment(&self, schema: &str, table: &str, column: &str) -> bool {
        self.lock()
            .schemas
            .get(schema)
            .and_then(|s| s.get(table))
            .is_some_and(|t| t.columns.iter().any(|c| c.name == column && c.auto_increment))
    }

    pub fn primary_key(&self, schema: &str, table: &str) -> Vec<String> {
        self.lock()
            .schemas
            .get(schema)
            .and_then(|s| s.get(table))
            .map(|t| t.primary.clone())
            .unwrap_or_default()
    }

    /// Statements executed against `schema`, in order.
    pub fn executed(&self, schema: &str) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .filter(|(s, _)| s == schema)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    fn with_table<T>(
        &self,
        schema: &str,
        table: &str,
        f: impl FnOnce(Option<&FakeTable>) -> T,
    ) -> Result<T, EngineError> {
        let state = self.lock();
        let tables = state
            .schemas
            .get(schema)
            .ok_or_else(|| unknown_database(schema))?;
        Ok(f(tables.get(table)))
    }
}

fn unknown_database(name: &str) -> EngineError {
    EngineError::new(format!("(42000): Unknown database '{}'", name))
}

fn missing_table(schema: &str, table: &str) -> EngineError {
    EngineError::new(format!("(42S02): Table '{}.{}' doesn't exist", schema, table))
}

#[async_trait]
impl DatabaseAdmin for FakeEngine {
    async fn schema_exists(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.has_schema(name))
    }

    async fn create_schema(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.schemas.contains_key(name) {
            return Err(EngineError::new(format!(
                "(HY000): Can't create database '{}'; database exists",
                name
            )));
        }
        state.schemas.insert(name.to_string(), Schema::new());
        Ok(())
    }

    async fn drop_schema(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.fail_drops {
            return Err(EngineError::new(format!(
                "(HY000): Error dropping database (can't rmdir './{}')",
                name
            )));
        }
        state.schemas.remove(name);
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<Box<dyn SchemaSession>, EngineError> {
        if !self.has_schema(name) {
            return Err(unknown_database(name));
        }
        Ok(Box::new(FakeSession {
            engine: self.clone(),
            schema: name.to_string(),
            foreign_key_checks: AtomicBool::new(true),
        }))
    }
}

/// A session bound to one schema of the fake engine.
pub struct FakeSession {
    engine: FakeEngine,
    schema: String,
    foreign_key_checks: AtomicBool,
}

impl FakeSession {
    fn run(&self, state: &mut EngineState, sql: &str) -> Result<u64, EngineError> {
        let body = LEADING_COMMENT_RE.replace(sql, "");
        let body = body.trim().trim_end_matches(';').trim();
        let fk_checks = self.foreign_key_checks.load(Ordering::SeqCst);
        let schema_name = self.schema.clone();
        let tables = state
            .schemas
            .get_mut(&schema_name)
            .ok_or_else(|| unknown_database(&schema_name))?;

        if let Some(caps) = CREATE_RE.captures(body) {
            let name = caps[1].to_string();
            if tables.contains_key(&name) {
                return Err(EngineError::new(format!(
                    "(42S01): Table '{}' already exists",
                    name
                )));
            }
            let table = parse_create_body(&caps[2]);
            for (_, ref_table, _) in &table.foreign_keys {
                if fk_checks && *ref_table != name && !tables.contains_key(ref_table) {
                    return Err(EngineError::new(format!(
                        "(HY000): Failed to open the referenced table '{}'",
                        ref_table
                    )));
                }
            }
            tables.insert(name, table);
            return Ok(0);
        }

        if let Some(caps) = INSERT_RE.captures(body) {
            let name = caps[1].to_string();
            let table = tables
                .get_mut(&name)
                .ok_or_else(|| missing_table(&schema_name, &name))?;
            if let Some(cols) = caps.get(2) {
                for col in ident_list(cols.as_str()) {
                    if !table.has_column(&col) {
                        return Err(EngineError::new(format!(
                            "(42S22): Unknown column '{}' in 'field list'",
                            col
                        )));
                    }
                }
            }
            let tuples = split_top_level(&caps[3]);
            let count = tuples.len() as u64;
            table.rows.extend(tuples);
            return Ok(count);
        }

        if let Some(caps) = ALTER_RE.captures(body) {
            let name = caps[1].to_string();
            let table = tables
                .get_mut(&name)
                .ok_or_else(|| missing_table(&schema_name, &name))?;
            for clause in split_top_level(&caps[2]) {
                apply_alter_clause(table, &clause)?;
            }
            return Ok(0);
        }

        if let Some(caps) = DROP_RE.captures(body) {
            tables.remove(&caps[1]);
            return Ok(0);
        }

        Ok(0)
    }
}

fn parse_create_body(body: &str) -> FakeTable {
    let mut table = FakeTable::default();
    for part in split_top_level(body) {
        let upper = part.to_uppercase();
        if upper.starts_with("PRIMARY KEY") {
            if let Some(caps) = PAREN_COLS_RE.captures(&part) {
                table.primary = ident_list(&caps[1]);
            }
        } else if let Some(caps) = INDEX_DEF_RE.captures(&part) {
            table
                .indexes
                .insert(caps[1].to_string(), ident_list(&caps[2]));
        } else if upper.starts_with("CONSTRAINT") || upper.starts_with("FOREIGN KEY") {
            if let Some(caps) = FK_DEF_RE.captures(&part) {
                table.foreign_keys.push((
                    caps[1].to_string(),
                    caps[2].to_string(),
                    caps[3].to_string(),
                ));
            }
        } else {
            let name = strip_ident(part.split_whitespace().next().unwrap_or_default());
            if upper.contains("PRIMARY KEY") {
                table.primary = vec![name.clone()];
            }
            table.columns.push(ColumnInfo {
                name,
                auto_increment: upper.contains("AUTO_INCREMENT"),
            });
        }
    }
    table
}

fn apply_alter_clause(table: &mut FakeTable, clause: &str) -> Result<(), EngineError> {
    let upper = clause.to_uppercase();

    if upper.starts_with("ADD PRIMARY KEY") {
        if !table.primary.is_empty() {
            return Err(EngineError::new("(42000): Multiple primary key defined"));
        }
        if let Some(caps) = PAREN_COLS_RE.captures(clause) {
            table.primary = ident_list(&caps[1]);
        }
        return Ok(());
    }

    if let Some(rest) = clause.get(3..).filter(|_| upper.starts_with("ADD "))
        && let Some(caps) = INDEX_DEF_RE.captures(rest.trim())
    {
        let name = caps[1].to_string();
        if table.indexes.contains_key(&name) {
            return Err(EngineError::new(format!(
                "(42000): Duplicate key name '{}'",
                name
            )));
        }
        table.indexes.insert(name, ident_list(&caps[2]));
        return Ok(());
    }

    if upper.starts_with("ADD CONSTRAINT") || upper.starts_with("ADD FOREIGN KEY") {
        if let Some(caps) = FK_DEF_RE.captures(clause) {
            table.foreign_keys.push((
                caps[1].to_string(),
                caps[2].to_string(),
                caps[3].to_string(),
            ));
        }
        return Ok(());
    }

    if let Some(caps) = MODIFY_RE.captures(clause) {
        let name = caps[1].to_string();
        if !table.has_column(&name) {
            return Err(EngineError::new(format!(
                "(42S22): Unknown column '{}' in 'table'",
                name
            )));
        }
        let auto_increment = upper.contains("AUTO_INCREMENT");
        if auto_increment && !table.is_key_column(&name) {
            return Err(EngineError::new(
                "(42000): Incorrect table definition; there can be only one auto column and it must be defined as a key",
            ));
        }
        for column in &mut table.columns {
            if column.name.eq_ignore_ascii_case(&name) {
                column.auto_increment = auto_increment;
            }
        }
        return Ok(());
    }

    if let Some(caps) = ADD_COLUMN_RE.captures(clause) {
        let name = caps[1].to_string();
        if table.has_column(&name) {
            return Err(EngineError::new(format!(
                "(42S21): Duplicate column name '{}'",
                name
            )));
        }
        table.columns.push(ColumnInfo {
            name,
            auto_increment: false,
        });
    }

    Ok(())
}

#[async_trait]
impl SchemaSession for FakeSession {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn execute(&self, sql: &str) -> Result<u64, EngineError> {
        let mut state = self.engine.lock();
        if let Some(fragment) = state
            .failing_fragments
            .iter()
            .find(|f| sql.contains(f.as_str()))
        {
            return Err(EngineError::new(format!(
                "(42000): You have an error in your SQL syntax; check the manual near '{}'",
                fragment
            )));
        }
        state
            .statements
            .push((self.schema.clone(), sql.to_string()));
        self.run(&mut state, sql)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, EngineError> {
        self.engine
            .with_table(&self.schema, table, |t| t.is_some())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EngineError> {
        self.engine.with_table(&self.schema, table, |t| {
            t.map(|t| t.columns.clone()).unwrap_or_default()
        })
    }

    async fn index_exists(&self, table: &str, index: &str) -> Result<bool, EngineError> {
        self.engine.with_table(&self.schema, table, |t| {
            t.is_some_and(|t| {
                if index.eq_ignore_ascii_case("PRIMARY") {
                    !t.primary.is_empty()
                } else {
                    t.indexes.contains_key(index)
                }
            })
        })
    }

    async fn is_primary_key_column(&self, table: &str, column: &str) -> Result<bool, EngineError> {
        self.engine.with_table(&self.schema, table, |t| {
            t.is_some_and(|t| t.primary.iter().any(|c| c.eq_ignore_ascii_case(column)))
        })
    }

    async fn is_key_column(&self, table: &str, column: &str) -> Result<bool, EngineError> {
        self.engine
            .with_table(&self.schema, table, |t| t.is_some_and(|t| t.is_key_column(column)))
    }

    async fn list_tables(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.engine.table_names(&self.schema))
    }

    async fn has_foreign_keys(&self, table: &str) -> Result<bool, EngineError> {
        self.engine.with_table(&self.schema, table, |t| {
            t.is_some_and(|t| !t.foreign_keys.is_empty())
        })
    }

    async fn show_create_table(&self, table: &str) -> Result<String, EngineError> {
        self.engine
            .with_table(&self.schema, table, |t| t.map(|t| t.ddl(table)))?
            .ok_or_else(|| missing_table(&self.schema, table))
    }

    async fn copy_rows_from(&self, source_schema: &str, table: &str) -> Result<u64, EngineError> {
        let mut state = self.engine.lock();
        if state.failing_copies.iter().any(|t| t == table) {
            return Err(EngineError::new(format!(
                "(HY000): Lost connection to MySQL server during query copying '{}'",
                table
            )));
        }
        let rows = state
            .schemas
            .get(source_schema)
            .and_then(|s| s.get(table))
            .map(|t| t.rows.clone())
            .ok_or_else(|| missing_table(source_schema, table))?;
        let target = state
            .schemas
            .get_mut(&self.schema)
            .and_then(|s| s.get_mut(table))
            .ok_or_else(|| missing_table(&self.schema, table))?;
        let count = rows.len() as u64;
        target.rows.extend(rows);
        Ok(count)
    }

    async fn check_table(&self, table: &str) -> Result<(), EngineError> {
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(missing_table(&self.schema, table))
        }
    }

    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<(), EngineError> {
        self.foreign_key_checks.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_in_column(
        &self,
        table: &str,
        _column: &str,
        old: &str,
        new: &str,
    ) -> Result<u64, EngineError> {
        let mut state = self.engine.lock();
        let target = state
            .schemas
            .get_mut(&self.schema)
            .and_then(|s| s.get_mut(table))
            .ok_or_else(|| missing_table(&self.schema, table))?;
        let mut changed = 0;
        for row in &mut target.rows {
            if row.contains(old) {
                *row = row.replace(old, new);
                changed += 1;
            }
        }
        Ok(changed)
    }
}
