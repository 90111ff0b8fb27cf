//! Command-line interface for Stackweave.
//!
//! # Commands
//!
//! - `deploy` - Deploy a template and print its outputs
//! - `remove` - Tear down everything a deployment instance created
//! - `plan` - Show the execution rounds without running anything
//! - `invoke` - Run a custom operation on some or all components
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: Debug output
//! - `--quiet` / `-q`: Errors only, no spinner
//! - `--config` / `-c`: Alternative global config file
//! - `--no-progress`: Disable the spinner
//!
//! ```bash
//! stackweave deploy --instance prod
//! stackweave plan --template infra/stackweave.yml
//! stackweave invoke rotate --alias key --input length=64
//! stackweave remove --instance prod
//! ```

mod common;
mod deploy;
mod invoke;
mod plan;
mod remove;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use common::OutputFormat;

/// Settings derived from the global flags and passed to every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter for `tracing-subscriber`; `RUST_LOG` takes precedence when set
    pub log_level: Option<String>,

    /// Whether to hide the spinner
    pub no_progress: bool,

    /// Alternative global config file
    pub config_path: Option<PathBuf>,
}

/// Deploy declarative component templates.
#[derive(Parser)]
#[command(
    name = "stackweave",
    about = "Deploy declarative component templates",
    version,
    author,
    long_about = "Stackweave deploys a template of components whose inputs reference each other's \
                  outputs, running independent components in parallel and removing components \
                  that left the template."
)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to an alternative global config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a template
    Deploy(deploy::DeployCommand),

    /// Remove every component of a deployment instance
    Remove(remove::RemoveCommand),

    /// Show the execution rounds of a template
    Plan(plan::PlanCommand),

    /// Run a custom operation on components of a template
    Invoke(invoke::InvokeCommand),
}

impl Cli {
    /// Derive the [`CliConfig`] from the global flags.
    ///
    /// `--verbose` maps to `debug`, `--quiet` to `error`, otherwise `info`.
    /// `--quiet` also hides the spinner.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Deploy(cmd) => cmd.execute(&config).await,
            Commands::Remove(cmd) => cmd.execute(&config).await,
            Commands::Plan(cmd) => cmd.execute(&config).await,
            Commands::Invoke(cmd) => cmd.execute(&config).await,
        }
    }
}
