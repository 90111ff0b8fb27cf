//! `stackweave deploy`

use super::CliConfig;
use super::common::{CommandContext, OutputFormat, load_template};
use crate::constants::DEFAULT_INSTANCE;
use crate::deploy::DeploymentReport;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Deploy a template.
#[derive(Args)]
pub struct DeployCommand {
    /// Template file (defaults to stackweave.yml in the current directory)
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Deployment instance id
    #[arg(short, long, default_value = DEFAULT_INSTANCE)]
    instance: String,

    /// Directory for state files
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl DeployCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let template = load_template(self.template.as_deref()).await?;
        let context =
            CommandContext::new(config, self.state_dir.as_deref(), &template.base_dir).await?;

        let result = context.deployer.deploy(&self.instance, &template).await;
        context.finish();
        let report = result?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.outputs)?),
            OutputFormat::Text => print_report(&self.instance, &report)?,
        }
        Ok(())
    }
}

fn print_report(instance: &str, report: &DeploymentReport) -> Result<()> {
    println!(
        "{} Deployed {} component(s) to '{}' in {} round(s)",
        "✓".green(),
        report.outputs.len(),
        instance,
        report.rounds
    );
    for alias in &report.removed {
        println!("  {} {}", "removed".yellow(), alias);
    }
    for (alias, outputs) in &report.outputs {
        println!("\n{}", alias.bold());
        println!("{}", serde_json::to_string_pretty(outputs)?);
    }
    Ok(())
}
