//! Components implemented as local processes.
//!
//! A component directory holds a `component.toml` manifest mapping operation
//! names to shell commands:
//!
//! ```toml
//! name = "bucket"
//! timeout_secs = 60
//!
//! [operations]
//! deploy = "./deploy.sh"
//! remove = "./remove.sh"
//! rotate = "./rotate.sh"
//! ```
//!
//! Commands run in the component directory with the inputs as JSON on stdin and
//! `STACKWEAVE_ALIAS` / `STACKWEAVE_OPERATION` set. Whatever JSON they print on
//! stdout becomes the operation's result; printing nothing means `{}`.

use super::{Component, ComponentLoader};
use crate::constants::{COMPONENT_ENTRY_FILE, DEPLOY_OPERATION, REMOVE_OPERATION};
use crate::core::StackError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Contents of `component.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentManifest {
    /// Display name; defaults to the directory name
    #[serde(default)]
    pub name: Option<String>,
    /// Per-invocation timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Operation name → shell command
    #[serde(default)]
    pub operations: BTreeMap<String, String>,
}

impl ComponentManifest {
    /// Read and validate the manifest in `dir`.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(COMPONENT_ENTRY_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read component manifest: {}", path.display()))?;

        let manifest: Self = toml::from_str(&content).map_err(|e| {
            StackError::InvalidComponentManifest {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        if !manifest.operations.contains_key(DEPLOY_OPERATION) {
            return Err(StackError::InvalidComponentManifest {
                path: path.display().to_string(),
                reason: format!("missing required operation '{DEPLOY_OPERATION}'"),
            }
            .into());
        }
        Ok(manifest)
    }
}

/// Loads [`ProcessComponent`]s from component directories.
#[derive(Debug, Clone, Default)]
pub struct ProcessLoader;

impl ProcessLoader {
    /// Create a loader.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComponentLoader for ProcessLoader {
    async fn load(&self, location: &Path, alias: &str) -> Result<Box<dyn Component>> {
        let manifest = ComponentManifest::load(location).await?;
        tracing::trace!(
            alias = %alias,
            name = manifest.name.as_deref().unwrap_or_default(),
            "Loaded component manifest"
        );
        Ok(Box::new(ProcessComponent {
            alias: alias.to_string(),
            dir: location.to_path_buf(),
            manifest,
        }))
    }
}

/// A component whose operations are shell commands.
#[derive(Debug, Clone)]
pub struct ProcessComponent {
    alias: String,
    dir: PathBuf,
    manifest: ComponentManifest,
}

impl ProcessComponent {
    fn failed(&self, operation: &str, reason: impl Into<String>) -> anyhow::Error {
        StackError::ComponentFailed {
            alias: self.alias.clone(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    async fn run(&self, operation: &str, inputs: &Value) -> Result<Value> {
        let Some(script) = self.manifest.operations.get(operation) else {
            return Err(StackError::OperationNotSupported {
                alias: self.alias.clone(),
                operation: operation.to_string(),
            }
            .into());
        };

        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(script);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd
        };
        cmd.current_dir(&self.dir)
            .env("STACKWEAVE_ALIAS", &self.alias)
            .env("STACKWEAVE_OPERATION", operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(alias = %self.alias, operation = %operation, "Executing command: {script}");

        let mut child = cmd
            .spawn()
            .map_err(|e| self.failed(operation, format!("failed to start '{script}': {e}")))?;

        let payload = serde_json::to_vec(inputs)?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // The command may exit without reading its inputs
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::trace!("Component did not read its inputs: {e}");
                }
            }
        };
        let run = async {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match self.manifest.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
                .await
                .map_err(|_| self.failed(operation, format!("timed out after {secs} seconds")))?,
            None => run.await,
        }
        .map_err(|e| self.failed(operation, format!("failed to wait for '{script}': {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let status = output
                .status
                .code()
                .map_or_else(|| "terminated by signal".to_string(), |code| format!("exit code {code}"));
            let reason =
                if stderr.is_empty() { status } else { format!("{status}: {stderr}") };
            return Err(self.failed(operation, reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(stdout.trim())
            .map_err(|e| self.failed(operation, format!("output is not valid JSON: {e}")))
    }
}

#[async_trait]
impl Component for ProcessComponent {
    async fn deploy(&self, inputs: Value) -> Result<Value> {
        self.run(DEPLOY_OPERATION, &inputs).await
    }

    async fn remove(&self) -> Result<()> {
        if !self.supports(REMOVE_OPERATION) {
            tracing::debug!(alias = %self.alias, "Component has no remove operation; nothing to tear down");
            return Ok(());
        }
        self.run(REMOVE_OPERATION, &Value::Object(Map::new())).await.map(|_| ())
    }

    fn supports(&self, operation: &str) -> bool {
        self.manifest.operations.contains_key(operation)
    }

    async fn call(&self, operation: &str, inputs: Value) -> Result<Value> {
        self.run(operation, &inputs).await
    }
}
