//! Best-effort patching of database settings in deployed project configs.
//!
//! Only a narrow set of textual patterns is recognised:
//!
//! - PHP array entries `'database' => '...'`, `'username' => '...'`,
//!   `'password' => '...'` and `'hostname' => '...'` (Laravel and
//!   CodeIgniter style, single-quoted values only)
//! - WordPress constants `define('DB_NAME', '...')`, `DB_USER`,
//!   `DB_PASSWORD` and `DB_HOST`
//!
//! Files that express their settings any other way are left untouched and
//! no error is reported. This is not a config-language parser.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use tracing::{debug, info, warn};

use crate::config::DeployCredentials;

/// Config locations probed relative to the deployed project root.
pub const CONFIG_LOCATIONS: &[&str] = &[
    "config/database.php",
    "config.php",
    "application/config/database.php",
    "wp-config.php",
];

/// Extensions scanned when a schema is renamed.
const SCHEMA_REFERENCE_EXTENSIONS: &[&str] = &["php", "json", "yml", "yaml", "xml", "config"];

/// Which recognised setting a pattern rewrites.
#[derive(Debug, Clone, Copy)]
enum Setting {
    Database,
    Username,
    Password,
    Host,
}

struct Pattern {
    regex: Regex,
    key: &'static str,
    wordpress: bool,
    setting: Setting,
}

fn array_entry(key: &'static str, setting: Setting) -> Pattern {
    Pattern {
        regex: Regex::new(&format!(r"'{}'\s*=>\s*'[^']*'", key)).expect("valid regex"),
        key,
        wordpress: false,
        setting,
    }
}

fn wp_define(key: &'static str, setting: Setting) -> Pattern {
    Pattern {
        regex: Regex::new(&format!(r"define\(\s*'{}'\s*,\s*'[^']*'\s*\)", key))
            .expect("valid regex"),
        key,
        wordpress: true,
        setting,
    }
}

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        array_entry("database", Setting::Database),
        array_entry("username", Setting::Username),
        array_entry("password", Setting::Password),
        array_entry("hostname", Setting::Host),
        wp_define("DB_NAME", Setting::Database),
        wp_define("DB_USER", Setting::Username),
        wp_define("DB_PASSWORD", Setting::Password),
        wp_define("DB_HOST", Setting::Host),
    ]
});

/// Values written into recognised settings.
#[derive(Debug, Clone, Copy)]
pub struct ConfigTarget<'a> {
    pub database: &'a str,
    pub credentials: &'a DeployCredentials,
}

impl ConfigTarget<'_> {
    fn value(&self, setting: Setting) -> &str {
        match setting {
            Setting::Database => self.database,
            Setting::Username => &self.credentials.username,
            Setting::Password => self.credentials.password(),
            Setting::Host => &self.credentials.host,
        }
    }
}

fn php_single_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Rewrite recognised settings in a config file's text.
///
/// Returns `None` when nothing matched.
pub fn patch_config_text(content: &str, target: &ConfigTarget<'_>) -> Option<String> {
    let mut patched = content.to_string();
    let mut changed = false;

    for pattern in PATTERNS.iter() {
        if !pattern.regex.is_match(&patched) {
            continue;
        }
        let value = php_single_quoted(target.value(pattern.setting));
        let replacement = if pattern.wordpress {
            format!("define('{}', '{}')", pattern.key, value)
        } else {
            format!("'{}' => '{}'", pattern.key, value)
        };
        patched = pattern
            .regex
            .replace_all(&patched, NoExpand(&replacement))
            .into_owned();
        changed = true;
    }

    changed.then_some(patched)
}

/// Patch every known config file under `root`. Blocking.
///
/// Returns the files that were rewritten. Read and write failures are
/// logged and skipped.
pub fn rewrite_project_configs(root: &Path, target: &ConfigTarget<'_>) -> Vec<PathBuf> {
    let mut rewritten = Vec::new();

    for location in CONFIG_LOCATIONS {
        let path = root.join(location);
        if !path.is_file() {
            continue;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping config {}: {}", path.display(), e);
                continue;
            }
        };

        let Some(patched) = patch_config_text(&content, target) else {
            debug!("No recognised settings in {}", path.display());
            continue;
        };

        match fs::write(&path, patched) {
            Ok(()) => {
                info!("Rewrote database settings in {}", location);
                rewritten.push(path);
            }
            Err(e) => warn!("Failed to write config {}: {}", path.display(), e),
        }
    }

    rewritten
}

/// Replace whole-word occurrences of `old_schema` with `new_schema` in the
/// project's config-like files. Blocking, best effort.
///
/// Returns the number of files changed.
pub fn replace_schema_references(root: &Path, old_schema: &str, new_schema: &str) -> usize {
    let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(old_schema))) else {
        return 0;
    };

    let mut changed = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    SCHEMA_REFERENCE_EXTENSIONS
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(e))
                });
            if !file_type.is_file() || !matches_ext {
                continue;
            }

            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if !pattern.is_match(&content) {
                continue;
            }
            let updated = pattern.replace_all(&content, NoExpand(new_schema));
            match fs::write(&path, updated.as_bytes()) {
                Ok(()) => changed += 1,
                Err(e) => warn!("Failed to update {}: {}", path.display(), e),
            }
        }
    }

    if changed > 0 {
        info!(
            "Replaced schema name {} -> {} in {} file(s)",
            old_schema, new_schema, changed
        );
    }
    changed
}
