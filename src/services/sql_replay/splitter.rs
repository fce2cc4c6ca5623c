//! Quote-aware SQL statement splitter for dump files.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted { quote: char, escaped: bool },
    LineComment,
    BlockComment,
}

/// Split a dump into statements.
///
/// A `;` ends a statement only in code, never inside quoted strings,
/// backtick identifiers or comments. Byte-order marks are removed. `--`,
/// `#` and `/* ... */` comments are dropped, including MySQL conditional
/// comments (`/*! ... */`), and block comments may span lines.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().filter(|c| *c != '\u{feff}').collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = Scan::Code;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            Scan::Quoted { quote, escaped } => {
                current.push(ch);
                state = if escaped {
                    Scan::Quoted { quote, escaped: false }
                } else if ch == '\\' && quote != '`' {
                    Scan::Quoted { quote, escaped: true }
                } else if ch == quote {
                    Scan::Code
                } else {
                    state
                };
            }
            Scan::LineComment => {
                if ch == '\n' {
                    current.push('\n');
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if ch == '*' && next == Some('/') {
                    current.push(' ');
                    state = Scan::Code;
                    i += 1;
                }
            }
            Scan::Code => match ch {
                '\'' | '"' | '`' => {
                    state = Scan::Quoted { quote: ch, escaped: false };
                    current.push(ch);
                }
                ';' => push_statement(&mut statements, &mut current),
                '#' => state = Scan::LineComment,
                '-' if next == Some('-')
                    && chars.get(i + 2).is_none_or(|c| c.is_whitespace()) =>
                {
                    state = Scan::LineComment;
                }
                '/' if next == Some('*') => {
                    state = Scan::BlockComment;
                    i += 1;
                }
                _ => current.push(ch),
            },
        }
        i += 1;
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Shorten a statement for log output.
pub fn preview(statement: &str) -> String {
    const MAX: usize = 100;
    let flat: String = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX {
        flat
    } else {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}
