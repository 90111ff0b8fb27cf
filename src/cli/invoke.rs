//! `stackweave invoke`

use super::CliConfig;
use super::common::{CommandContext, load_template};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Run a custom operation on components of a template.
#[derive(Args)]
pub struct InvokeCommand {
    /// Operation to run, as named in each component's manifest
    operation: String,

    /// Component to target; repeat for several (defaults to every component)
    #[arg(short, long = "alias")]
    aliases: Vec<String>,

    /// Input as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "input", value_parser = parse_key_value)]
    inputs: Vec<(String, String)>,

    /// Inputs as a JSON object; --input pairs are applied on top
    #[arg(long)]
    inputs_json: Option<String>,

    /// Template file (defaults to stackweave.yml in the current directory)
    #[arg(short, long)]
    template: Option<PathBuf>,
}

impl InvokeCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let inputs = build_inputs(self.inputs_json.as_deref(), &self.inputs)?;
        let template = load_template(self.template.as_deref()).await?;
        let context = CommandContext::new(config, None, &template.base_dir).await?;

        let result =
            context.deployer.invoke(&template, &self.operation, &self.aliases, inputs).await;
        context.finish();
        let results = result?;

        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(())
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn build_inputs(json: Option<&str>, pairs: &[(String, String)]) -> Result<Value> {
    let mut inputs = match json {
        Some(raw) => match serde_json::from_str(raw).context("--inputs-json is not valid JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--inputs-json must be a JSON object"),
        },
        None => Map::new(),
    };
    for (key, raw) in pairs {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        inputs.insert(key.clone(), value);
    }
    Ok(Value::Object(inputs))
}
