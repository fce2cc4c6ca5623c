//! Classification of dump statements for the replay rules.

use std::sync::LazyLock;

use regex::Regex;

/// Session pragmas the engine's own connection defaults already cover.
const SESSION_PRAGMAS: &[&str] = &[
    "SET SQL_MODE",
    "SET TIME_ZONE",
    "SET CHARACTER_SET_CLIENT",
    "SET CHARACTER_SET_RESULTS",
    "SET COLLATION_CONNECTION",
    "SET NAMES",
    "START TRANSACTION",
    "COMMIT",
];

static LEADING_BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?s)\s*/\*.*?\*/\s*").expect("valid regex"));

static CREATE_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^CREATE\s+TABLE(?:\s+IF\s+NOT\s+EXISTS)?\s+`?(\w+)`?").expect("valid regex")
});

static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^INSERT\s+(?:IGNORE\s+)?INTO\s+`?(\w+)`?\s*(?:\(([^)]*)\))?")
        .expect("valid regex")
});

static ALTER_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ALTER\s+TABLE\s+`?(\w+)`?").expect("valid regex")
});

static MODIFY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMODIFY\s+(?:COLUMN\s+)?`?(\w+)`?").expect("valid regex"));

static AUTO_INCREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAUTO_INCREMENT\b").expect("valid regex"));

static ADD_PRIMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bADD\s+PRIMARY\s+KEY\b").expect("valid regex"));

static ADD_INDEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bADD\s+(?:UNIQUE\s+(?:KEY|INDEX)|UNIQUE|FULLTEXT\s+(?:KEY|INDEX)|FULLTEXT|INDEX|KEY)\s+`?(\w+)`?",
    )
    .expect("valid regex")
});

static ADD_CLAUSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bADD\s+(?:COLUMN\s+)?`?(\w+)`?").expect("valid regex"));

static FOREIGN_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)FOREIGN\s+KEY\s*(?:`?\w+`?\s*)?\(\s*`?(\w+)`?[^)]*\)\s*REFERENCES\s+`?(\w+)`?\s*\(\s*`?(\w+)`?",
    )
    .expect("valid regex")
});

/// Keywords that can follow `ADD` without naming a column.
const ADD_KEYWORDS: &[&str] = &[
    "PRIMARY",
    "UNIQUE",
    "INDEX",
    "KEY",
    "FULLTEXT",
    "SPATIAL",
    "CONSTRAINT",
    "FOREIGN",
    "CHECK",
    "PARTITION",
];

/// Something an `ALTER TABLE ... ADD` clause introduces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddTarget {
    Index(String),
    Column(String),
}

/// A `FOREIGN KEY ... REFERENCES table (column)` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    SessionPragma,
    CreateTable {
        table: String,
    },
    /// `columns` is empty when the statement has no explicit column list.
    Insert {
        table: String,
        columns: Vec<String>,
    },
    AlterTable {
        table: String,
        /// Column of a `MODIFY ... AUTO_INCREMENT` clause
        auto_increment_column: Option<String>,
        adds: Vec<AddTarget>,
    },
    Other,
}

/// A classified statement ready for the replay rules.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub sql: String,
    pub kind: StatementKind,
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl ParsedStatement {
    pub fn parse(sql: &str) -> Self {
        let body = LEADING_BLOCK_COMMENT_RE.replace(sql, "");
        let kind = classify(&body);
        let foreign_keys = FOREIGN_KEY_RE
            .captures_iter(&body)
            .map(|caps| ForeignKeyRef {
                table: caps[2].to_string(),
                column: caps[3].to_string(),
            })
            .collect();

        Self {
            sql: sql.to_string(),
            kind,
            foreign_keys,
        }
    }

    /// Table the statement creates or alters, if any.
    pub fn own_table(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::CreateTable { table } | StatementKind::AlterTable { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }
}

fn classify(body: &str) -> StatementKind {
    let upper = body.trim_start().to_uppercase();
    if SESSION_PRAGMAS.iter().any(|p| starts_with_words(&upper, p)) {
        return StatementKind::SessionPragma;
    }

    if let Some(caps) = CREATE_TABLE_RE.captures(body) {
        return StatementKind::CreateTable {
            table: caps[1].to_string(),
        };
    }

    if let Some(caps) = INSERT_RE.captures(body) {
        let columns = caps
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|c| c.trim().trim_matches('`').to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        return StatementKind::Insert {
            table: caps[1].to_string(),
            columns,
        };
    }

    if let Some(caps) = ALTER_TABLE_RE.captures(body) {
        let auto_increment_column = if AUTO_INCREMENT_RE.is_match(body) {
            MODIFY_RE.captures(body).map(|m| m[1].to_string())
        } else {
            None
        };
        return StatementKind::AlterTable {
            table: caps[1].to_string(),
            auto_increment_column,
            adds: add_targets(body),
        };
    }

    StatementKind::Other
}

/// Compare a prefix on word boundaries so `COMMIT` does not match `COMMITTED`.
fn starts_with_words(upper: &str, prefix: &str) -> bool {
    let normalized: String = upper.split_whitespace().collect::<Vec<_>>().join(" ");
    normalized.starts_with(prefix)
        && normalized[prefix.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_')
}

fn add_targets(body: &str) -> Vec<AddTarget> {
    let mut targets = Vec::new();
    if ADD_PRIMARY_RE.is_match(body) {
        targets.push(AddTarget::Index("PRIMARY".to_string()));
    }
    for caps in ADD_INDEX_RE.captures_iter(body) {
        let name = caps[1].to_string();
        // `ADD UNIQUE KEY (col)` has no name; the regex then captured nothing useful.
        if !ADD_KEYWORDS.contains(&name.to_uppercase().as_str()) {
            targets.push(AddTarget::Index(name));
        }
    }
    for caps in ADD_CLAUSE_RE.captures_iter(body) {
        let word = caps[1].to_string();
        if !ADD_KEYWORDS.contains(&word.to_uppercase().as_str()) {
            targets.push(AddTarget::Column(word));
        }
    }
    targets
}
