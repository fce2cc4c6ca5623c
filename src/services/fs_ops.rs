//! Blocking filesystem helpers for deployment and lifecycle operations.
//!
//! Callers run these on `tokio::task::spawn_blocking`.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

/// Recursively copy `src` into `dst`, creating `dst` and any missing parents.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            warn!("Skipping special file {}", entry.path().display());
        }
    }
    Ok(())
}

/// Remove a directory tree. A missing directory is not an error.
pub fn remove_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Move a directory tree.
///
/// Tries an atomic rename first. When that fails (for example across
/// devices) the tree is copied and the source removed; if the source cannot
/// be removed the copy is deleted again so only one tree remains.
pub fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination {} already exists", dst.display()),
        ));
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            info!(
                "Rename {} -> {} failed ({}), falling back to copy",
                src.display(),
                dst.display(),
                e
            );
            copy_then_remove(src, dst)
        }
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    copy_then_remove_with(src, dst, detach_source)
}

/// Copy `src` to `dst`, then hand `src` to `remove_source`. A failed copy
/// or a failed removal deletes `dst` again.
fn copy_then_remove_with<F>(src: &Path, dst: &Path, remove_source: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    if let Err(e) = copy_dir(src, dst) {
        if let Err(cleanup) = remove_dir(dst) {
            warn!("Failed to remove partial copy {}: {}", dst.display(), cleanup);
        }
        return Err(e);
    }

    if let Err(e) = remove_source(src) {
        if let Err(cleanup) = remove_dir(dst) {
            warn!("Failed to roll back copy {}: {}", dst.display(), cleanup);
        }
        return Err(e);
    }

    Ok(())
}

/// Take `src` out of place with a same-directory rename, then delete it.
///
/// The rename either succeeds or leaves `src` untouched, so a failure here
/// never leaves a half-emptied source behind. Once detached, a failed
/// delete only leaves a hidden leftover next to the old path.
fn detach_source(src: &Path) -> io::Result<()> {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let detached = src.with_file_name(format!(".{}.moved-{}", name, Uuid::new_v4().simple()));

    fs::rename(src, &detached)?;
    if let Err(e) = remove_dir(&detached) {
        warn!("Failed to remove moved source {}: {}", detached.display(), e);
    }
    Ok(())
}

/// Render a tree listing of `dir`, entries sorted by name.
pub fn list_tree(dir: &Path) -> io::Result<String> {
    let mut out = String::new();
    list_into(dir, "", &mut out)?;
    Ok(out)
}

fn list_into(dir: &Path, prefix: &str, out: &mut String) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        out.push_str(prefix);
        if !prefix.is_empty() {
            out.push_str("└── ");
        }
        out.push_str(&name);
        out.push('\n');
        if entry.file_type()?.is_dir() {
            list_into(&entry.path(), &format!("{}    ", prefix), out)?;
        }
    }
    Ok(())
}
