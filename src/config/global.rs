//! Global configuration.
//!
//! User-wide settings live in `~/.stackweave/config.toml` (`%LOCALAPPDATA%\stackweave`
//! on Windows):
//!
//! ```toml
//! state_dir = "~/.stackweave/state"
//! component_dirs = ["~/components", "/opt/stackweave/components"]
//! max_resolution_passes = 32
//! ```
//!
//! Every field is optional. Paths may use `~` and environment variables.
//!
//! # Environment Variables
//!
//! - `STACKWEAVE_CONFIG` - alternative config file path
//! - `STACKWEAVE_STATE_DIR` - overrides `state_dir`
//! - `STACKWEAVE_COMPONENTS_DIR` - search path list, searched before `component_dirs`

use crate::constants::{DEFAULT_MAX_RESOLUTION_PASSES, DEFAULT_STATE_SUBDIR};
use crate::core::StackError;
use crate::utils::fs::expand_path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "STACKWEAVE_CONFIG";
/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "STACKWEAVE_STATE_DIR";
/// Environment variable holding extra component search directories.
pub const COMPONENTS_DIR_ENV: &str = "STACKWEAVE_COMPONENTS_DIR";

const fn default_max_resolution_passes() -> usize {
    DEFAULT_MAX_RESOLUTION_PASSES
}

fn is_default_max_resolution_passes(passes: &usize) -> bool {
    *passes == DEFAULT_MAX_RESOLUTION_PASSES
}

/// Global configuration for Stackweave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Directory for state files; defaults to `.stackweave/state` next to the template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,

    /// Directories searched for named component references, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_dirs: Vec<String>,

    /// Upper bound on static resolution passes
    #[serde(
        default = "default_max_resolution_passes",
        skip_serializing_if = "is_default_max_resolution_passes"
    )]
    pub max_resolution_passes: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            component_dirs: Vec::new(),
            max_resolution_passes: DEFAULT_MAX_RESOLUTION_PASSES,
        }
    }
}

impl GlobalConfig {
    /// Load from the default location, or defaults if there is no file.
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from `path` if given, else from `STACKWEAVE_CONFIG`, else from the default location.
    ///
    /// An explicitly named file must exist.
    pub async fn load_with_optional(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path).await;
        }
        if let Some(from_env) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&from_env)).await;
        }
        Self::load().await
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_resolution_passes == 0 {
            return Err(StackError::ConfigError {
                message: "max_resolution_passes must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Default config file location.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("stackweave")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".stackweave")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// State directory: `cli` flag, then `STACKWEAVE_STATE_DIR`, then `state_dir`,
    /// then `.stackweave/state` under `template_dir`.
    pub fn state_dir(&self, cli: Option<&Path>, template_dir: &Path) -> Result<PathBuf> {
        self.state_dir_with_env(cli, std::env::var_os(STATE_DIR_ENV), template_dir)
    }

    fn state_dir_with_env(
        &self,
        cli: Option<&Path>,
        env: Option<OsString>,
        template_dir: &Path,
    ) -> Result<PathBuf> {
        if let Some(dir) = cli {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = env.filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.state_dir {
            return expand_path(dir);
        }
        Ok(template_dir.join(DEFAULT_STATE_SUBDIR))
    }

    /// Search directories for named component references.
    pub fn component_search_dirs(&self) -> Result<Vec<PathBuf>> {
        self.component_search_dirs_with_env(std::env::var_os(COMPONENTS_DIR_ENV))
    }

    fn component_search_dirs_with_env(&self, env: Option<OsString>) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = env
            .map(|paths| std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        for dir in &self.component_dirs {
            dirs.push(expand_path(dir)?);
        }
        Ok(dirs)
    }
}
