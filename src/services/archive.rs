//! Archive intake: staging uploaded bundles into request-scoped scratch trees.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{AppError, AppResult};

/// Metadata folders some archivers add next to the real content.
const IGNORED_TOP_LEVEL: &[&str] = &["__MACOSX"];

/// A scratch directory holding one extracted archive.
///
/// The directory and everything in it is removed when this value drops, on
/// success and failure alike.
#[derive(Debug)]
pub struct ScratchTree {
    dir: TempDir,
    entries: usize,
}

impl ScratchTree {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of files written during extraction.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Extract `archive` into a fresh scratch directory under `scratch_parent`.
///
/// Entries whose names would escape the scratch directory are skipped.
/// Any failure removes whatever was already extracted.
pub fn extract_archive(archive: &Path, scratch_parent: &Path) -> AppResult<ScratchTree> {
    fs::create_dir_all(scratch_parent).map_err(|e| {
        AppError::FileSystem(format!(
            "Failed to create scratch directory {}: {}",
            scratch_parent.display(),
            e
        ))
    })?;

    let dir = tempfile::Builder::new()
        .prefix("extract-")
        .tempdir_in(scratch_parent)
        .map_err(|e| AppError::FileSystem(format!("Failed to create scratch tree: {}", e)))?;

    let file = File::open(archive)
        .map_err(|e| AppError::Archive(format!("Failed to open archive: {}", e)))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| AppError::Archive(format!("Failed to read zip archive: {}", e)))?;

    let mut written = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| AppError::Archive(format!("Failed to read archive entry {}: {}", i, e)))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        if is_ignored(&relative) {
            continue;
        }

        let target: PathBuf = dir.path().join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| extract_error(&relative, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| extract_error(&relative, e))?;
        }
        let mut out = File::create(&target).map_err(|e| extract_error(&relative, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| extract_error(&relative, e))?;
        written += 1;
    }

    if written == 0 {
        return Err(AppError::Archive("Archive contains no files".to_string()));
    }

    debug!(
        "Extracted {} file(s) into {}",
        written,
        dir.path().display()
    );
    Ok(ScratchTree {
        dir,
        entries: written,
    })
}

fn is_ignored(relative: &Path) -> bool {
    relative
        .components()
        .next()
        .is_some_and(|c| IGNORED_TOP_LEVEL.iter().any(|i| c.as_os_str() == *i))
}

fn extract_error(entry: &Path, err: io::Error) -> AppError {
    AppError::Archive(format!(
        "Failed to extract {}: {}",
        entry.display(),
        err
    ))
}
