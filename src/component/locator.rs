//! Resolves component references to directories.
//!
//! A reference is either local or named:
//!
//! - **Local** (`./bucket`, `../shared/db`, `/opt/components/site`, `~/components/x`)
//!   is resolved against the template directory
//! - **Named** (`website`, `aws/s3-bucket`) is looked up as a sub-directory of
//!   each configured component directory, first match wins
//!
//! Either way the directory must contain [`COMPONENT_ENTRY_FILE`].

use crate::constants::COMPONENT_ENTRY_FILE;
use crate::core::StackError;
use crate::utils::fs::expand_path;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps component references to implementation directories.
#[async_trait]
pub trait ComponentLocator: Send + Sync {
    /// Resolve every reference in `refs`. Local references resolve against `base_dir`.
    async fn resolve_component_refs(
        &self,
        refs: &[String],
        base_dir: &Path,
    ) -> Result<HashMap<String, PathBuf>>;
}

/// Locates components on the local file system.
#[derive(Debug, Clone, Default)]
pub struct FsLocator {
    search_dirs: Vec<PathBuf>,
}

impl FsLocator {
    /// Create a locator searching `search_dirs` for named references, in order.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
        }
    }

    fn resolve_one(&self, reference: &str, base_dir: &Path) -> Result<PathBuf> {
        if is_local_reference(reference) {
            let expanded = expand_path(reference)?;
            let path = if expanded.is_absolute() { expanded } else { base_dir.join(expanded) };
            return check_entry_point(path, reference);
        }

        for dir in &self.search_dirs {
            let candidate = dir.join(reference);
            if candidate.is_dir() {
                return check_entry_point(candidate, reference);
            }
        }

        Err(StackError::ComponentNotFound {
            reference: reference.to_string(),
            searched: self.search_dirs.iter().map(|d| d.display().to_string()).collect(),
        }
        .into())
    }
}

#[async_trait]
impl ComponentLocator for FsLocator {
    async fn resolve_component_refs(
        &self,
        refs: &[String],
        base_dir: &Path,
    ) -> Result<HashMap<String, PathBuf>> {
        let mut resolved = HashMap::with_capacity(refs.len());
        for reference in refs {
            if resolved.contains_key(reference) {
                continue;
            }
            let location = self.resolve_one(reference, base_dir)?;
            tracing::trace!(reference = %reference, location = %location.display(), "Resolved component");
            resolved.insert(reference.clone(), location);
        }
        Ok(resolved)
    }
}

/// Whether `reference` names a path rather than a component in a search directory.
pub fn is_local_reference(reference: &str) -> bool {
    reference.starts_with("./")
        || reference.starts_with("../")
        || reference.starts_with('~')
        || reference == "."
        || Path::new(reference).is_absolute()
        || (cfg!(windows) && (reference.starts_with(".\\") || reference.starts_with("..\\")))
}

fn check_entry_point(path: PathBuf, reference: &str) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(StackError::ComponentNotFound {
            reference: reference.to_string(),
            searched: vec![path.display().to_string()],
        }
        .into());
    }
    if !path.join(COMPONENT_ENTRY_FILE).is_file() {
        return Err(StackError::MissingEntryPoint {
            path: path.display().to_string(),
            entry_point: COMPONENT_ENTRY_FILE.to_string(),
        }
        .into());
    }
    Ok(path)
}
