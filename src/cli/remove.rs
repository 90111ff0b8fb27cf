//! `stackweave remove`

use super::CliConfig;
use super::common::{CommandContext, discover_template};
use crate::constants::DEFAULT_INSTANCE;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Remove every component recorded for a deployment instance.
///
/// The template itself is not needed, only its directory: state and local
/// component references are resolved relative to it.
#[derive(Args)]
pub struct RemoveCommand {
    /// Template file whose directory anchors state and local components
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Deployment instance id
    #[arg(short, long, default_value = DEFAULT_INSTANCE)]
    instance: String,

    /// Directory for state files
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

impl RemoveCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let base_dir = match discover_template(self.template.as_deref(), &cwd) {
            Ok(path) => {
                let absolute = if path.is_absolute() { path } else { cwd.join(path) };
                absolute.parent().map(Path::to_path_buf).unwrap_or(cwd)
            }
            Err(_) => cwd,
        };

        let context = CommandContext::new(config, self.state_dir.as_deref(), &base_dir).await?;
        let result = context.deployer.remove(&self.instance, &base_dir).await;
        context.finish();
        let report = result?;

        if report.removed.is_empty() {
            println!("Nothing to remove for '{}'", self.instance);
        } else {
            println!(
                "{} Removed {} component(s) from '{}'",
                "✓".green(),
                report.removed.len(),
                self.instance
            );
            for alias in &report.removed {
                println!("  {alias}");
            }
        }
        Ok(())
    }
}
