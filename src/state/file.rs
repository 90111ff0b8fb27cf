//! File-backed state store.
//!
//! Each instance is stored as `{state_dir}/{instance}.toml`:
//!
//! ```toml
//! # Auto-generated deployment state - DO NOT EDIT
//! version = 1
//! instance = "prod"
//! committed_at = "2026-10-18T09:12:44.201Z"
//!
//! [components]
//! bucket = "./components/bucket"
//! site = "website"
//! ```

use super::lock::StateLock;
use super::{ComponentState, StateStore, validate_instance_id};
use crate::constants::STATE_FORMAT_VERSION;
use crate::core::StackError;
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// On-disk layout of a state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    committed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    components: ComponentState,
}

/// Stores state as TOML files in one directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: PathBuf,
}

impl FileStateStore {
    /// Store files under `state_dir`, which is created on first commit.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Path of the state file for `instance`.
    pub fn state_path(&self, instance: &str) -> PathBuf {
        self.state_dir.join(format!("{instance}.toml"))
    }

    async fn read(&self, instance: &str) -> Result<ComponentState> {
        let path = self.state_path(instance);
        if !path.exists() {
            return Ok(ComponentState::new());
        }

        let content = tokio::fs::read_to_string(&path).await.with_context(|| {
            format!(
                "Cannot read state file: {}\n\n\
                    Possible causes:\n\
                    - Permission denied (check file ownership)\n\
                    - File is corrupted or locked by another process",
                path.display()
            )
        })?;

        if content.trim().is_empty() {
            return Ok(ComponentState::new());
        }

        let file: StateFile = toml::from_str(&content)
            .map_err(|e| StackError::StateParseError {
                file: path.display().to_string(),
                reason: e.to_string(),
            })
            .with_context(|| {
                format!(
                    "Invalid TOML syntax in state file: {}\n\n\
                    The state file may be corrupted. Restore it from backup, or delete it\n\
                    to forget the previous deployment (its components will not be removed)",
                    path.display()
                )
            })?;

        if file.version > STATE_FORMAT_VERSION {
            return Err(anyhow::anyhow!(
                "State file {} has format version {}, but this binary supports up to {}.\n\
                 Upgrade stackweave before deploying this instance.",
                path.display(),
                file.version,
                STATE_FORMAT_VERSION
            ));
        }

        Ok(file.components)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_state(&self, instance: &str) -> Result<ComponentState> {
        validate_instance_id(instance)?;
        self.read(instance).await
    }

    async fn commit_state(&self, instance: &str, components: &ComponentState) -> Result<()> {
        validate_instance_id(instance)?;
        let _lock = StateLock::acquire(&self.state_dir, instance).await?;

        let file = StateFile {
            version: STATE_FORMAT_VERSION,
            instance: instance.to_string(),
            committed_at: Some(Utc::now()),
            components: components.clone(),
        };
        let mut content = String::from("# Auto-generated deployment state - DO NOT EDIT\n");
        content.push_str(&toml::to_string_pretty(&file).context("Failed to serialize state")?);

        let path = self.state_path(instance);
        tokio::task::spawn_blocking(move || {
            atomic_write(&path, content.as_bytes()).with_context(|| {
                format!(
                    "Cannot write state file: {}\n\n\
                    Possible causes:\n\
                    - Permission denied\n\
                    - Disk is full or read-only",
                    path.display()
                )
            })
        })
        .await
        .with_context(|| "spawn_blocking panicked")??;

        tracing::debug!(instance = %instance, components = components.len(), "State committed");
        Ok(())
    }
}
