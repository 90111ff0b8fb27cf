//! `stackweave plan`

use super::CliConfig;
use super::common::{CommandContext, OutputFormat, load_template};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Show the rounds a deployment would run.
#[derive(Args)]
pub struct PlanCommand {
    /// Template file (defaults to stackweave.yml in the current directory)
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl PlanCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let template = load_template(self.template.as_deref()).await?;
        let context = CommandContext::new(config, None, &template.base_dir).await?;

        let result = context.deployer.plan(&template).await;
        context.finish();
        let rounds = result?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rounds)?),
            OutputFormat::Text if rounds.is_empty() => println!("The template has no components"),
            OutputFormat::Text => {
                for (index, round) in rounds.iter().enumerate() {
                    println!("{} {}", format!("Round {}:", index + 1).bold(), round.join(", "));
                }
            }
        }
        Ok(())
    }
}
