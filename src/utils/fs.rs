//! File system helpers
//!
//! - [`atomic_write`] writes through a unique temporary file and a rename, so
//!   state files are never observed half-written
//! - [`ensure_dir`] creates a directory tree or fails if a file is in the way
//! - [`expand_path`] applies `~` and environment variable expansion to
//!   user-supplied paths

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Creates `path` and its parents if missing.
///
/// Fails if `path` exists and is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// Content goes to a uniquely named temporary file in the target's directory,
/// is synced to disk, and is then persisted over `path`. Concurrent writers
/// never share a temporary file, so the target always holds one complete write.
///
/// Parent directories are created as needed.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut temp = NamedTempFile::new_in(parent).with_context(|| {
        format!(
            "Failed to create temp file in {}\n\nCheck file permissions and that directory exists",
            parent.display()
        )
    })?;

    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().with_context(|| "Failed to sync file to disk")?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Expands `~` and `$VAR` / `${VAR}` in a user-supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path '{raw}'"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
