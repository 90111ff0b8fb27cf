//! Helpers shared by the CLI commands.

use super::CliConfig;
use crate::component::{FsLocator, ProcessLoader};
use crate::config::GlobalConfig;
use crate::constants::TEMPLATE_FILE_NAMES;
use crate::core::{ProgressSink, StackError, StatusSink, TracingSink};
use crate::deploy::Deployer;
use crate::state::FileStateStore;
use crate::template::{Template, TemplateSource};
use crate::utils::progress::is_progress_disabled;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Output format for commands that print results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Text,
    /// JSON for scripts
    Json,
}

/// Find the template to use: `explicit` if given, else the first default file name in `dir`.
pub fn discover_template(explicit: Option<&Path>, dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    TEMPLATE_FILE_NAMES.iter().map(|name| dir.join(name)).find(|path| path.is_file()).ok_or_else(
        || {
            StackError::TemplateNotFound {
                path: dir.join(TEMPLATE_FILE_NAMES[0]).display().to_string(),
            }
            .into()
        },
    )
}

/// Load the template named on the command line or found in the working directory.
pub async fn load_template(explicit: Option<&Path>) -> Result<Template> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let path = discover_template(explicit, &cwd)?;
    tracing::debug!(template = %path.display(), "Loading template");
    Template::load(TemplateSource::Path(path)).await
}

/// A [`Deployer`] wired to the file system, plus the spinner to clear afterwards.
pub struct CommandContext {
    /// The configured deployer
    pub deployer: Deployer,
    progress: Option<ProgressSink>,
}

impl CommandContext {
    /// Build a deployer from global configuration and CLI flags.
    pub async fn new(cli: &CliConfig, state_dir: Option<&Path>, template_dir: &Path) -> Result<Self> {
        let config = GlobalConfig::load_with_optional(cli.config_path.as_deref()).await?;
        let state_dir = config.state_dir(state_dir, template_dir)?;
        tracing::debug!(state_dir = %state_dir.display(), "Using state directory");

        let locator = FsLocator::new(config.component_search_dirs()?);
        let progress =
            (!cli.no_progress && !is_progress_disabled()).then(ProgressSink::new);
        let sink: Arc<dyn StatusSink> = match &progress {
            Some(progress) => Arc::new(progress.clone()),
            None => Arc::new(TracingSink),
        };

        let deployer = Deployer::new(
            Arc::new(locator),
            Arc::new(ProcessLoader::new()),
            Arc::new(FileStateStore::new(state_dir)),
        )
        .with_sink(sink)
        .with_max_resolution_passes(config.max_resolution_passes);

        Ok(Self {
            deployer,
            progress,
        })
    }

    /// Clear the spinner, if any.
    pub fn finish(&self) {
        if let Some(progress) = &self.progress {
            progress.finish();
        }
    }
}
