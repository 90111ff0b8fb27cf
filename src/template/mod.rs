//! Templates: the declarative description of a deployment
//!
//! A template is a mapping from alias to entry. An entry that is a mapping with a
//! string `component` key declares a component instance:
//!
//! ```yaml
//! region: eu-west-1
//! bucket:
//!   component: ./components/bucket
//!   inputs:
//!     name: "assets-${env.STAGE}"
//!     region: "${region}"
//! site:
//!   component: website
//!   inputs:
//!     bucket_arn: "${bucket.arn}"
//! ```
//!
//! Every other entry is a static value that references may point into. Templates
//! can be read from JSON, YAML or TOML files, or given inline as a JSON value.

pub mod reference;

use crate::core::StackError;
use crate::graph::DependencyGraph;
use anyhow::{Context, Result};
use reference::{StaticScope, find_references, is_component_declaration, resolve_value};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a template comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// A JSON, YAML or TOML file
    Path(PathBuf),
    /// An already-parsed template; local component references resolve against the working directory
    Inline(Value),
}

/// A component entry of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDeclaration {
    /// Reference to the component implementation, as written
    pub component: String,
    /// Raw inputs; an empty mapping when omitted
    pub inputs: Value,
}

/// A loaded template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Top-level entries keyed by alias
    pub entries: Map<String, Value>,
    /// Directory local component references are resolved against
    pub base_dir: PathBuf,
}

impl Template {
    /// Build a template from a parsed value.
    pub fn new(value: Value, base_dir: impl Into<PathBuf>) -> Result<Self> {
        match value {
            Value::Object(entries) => Ok(Self {
                entries,
                base_dir: base_dir.into(),
            }),
            other => Err(StackError::InvalidTemplate {
                reason: format!(
                    "the template must be a mapping of aliases to entries, found {}",
                    reference::type_name(&other)
                ),
            }
            .into()),
        }
    }

    /// Load a template from a file or an inline value.
    pub async fn load(source: TemplateSource) -> Result<Self> {
        match source {
            TemplateSource::Inline(value) => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                Self::new(value, cwd)
            }
            TemplateSource::Path(path) => Self::load_file(&path).await,
        }
    }

    async fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StackError::TemplateNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template file: {}", path.display()))?;

        let parse_error = |reason: String| StackError::TemplateParseError {
            file: path.display().to_string(),
            reason,
        };
        let value: Value = match extension {
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            "yml" | "yaml" => {
                serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            _ => {
                return Err(StackError::UnsupportedTemplateFormat {
                    path: path.display().to_string(),
                }
                .into());
            }
        };

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().context("Failed to read current directory")?.join(path)
        };
        let base_dir = absolute.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::new(value, base_dir)
    }

    /// Component declarations keyed by alias, in alias order.
    pub fn component_declarations(&self) -> Result<BTreeMap<String, ComponentDeclaration>> {
        let mut declarations = BTreeMap::new();
        for (alias, entry) in &self.entries {
            let Some(component) = entry.get("component") else {
                continue;
            };
            let Value::String(component) = component else {
                return Err(StackError::InvalidTemplate {
                    reason: format!("the 'component' of '{alias}' must be a string"),
                }
                .into());
            };
            let inputs = match entry.get("inputs") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(inputs) => inputs.clone(),
            };
            declarations.insert(
                alias.clone(),
                ComponentDeclaration {
                    component: component.clone(),
                    inputs,
                },
            );
        }
        Ok(declarations)
    }

    /// Aliases of every component declaration.
    pub fn component_aliases(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| is_component_declaration(entry))
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Substitute static references until a pass changes nothing.
    ///
    /// Static values that reference themselves, directly or through each other,
    /// are rejected up front with [`StackError::CircularStaticReference`]; a
    /// value that splices itself in twice would otherwise double on every pass.
    /// Each pass then resolves every entry against a snapshot of the entries at
    /// the start of the pass. References to component aliases stay verbatim for
    /// the executor. Fails with [`StackError::StaticResolutionDiverged`] when
    /// `max_passes` passes all made substitutions.
    pub fn resolve_static(&self, max_passes: usize) -> Result<Self> {
        let cycles = static_reference_cycles(&self.entries);
        if !cycles.is_empty() {
            return Err(StackError::CircularStaticReference {
                cycles,
            }
            .into());
        }

        let mut entries = self.entries.clone();
        let mut pending = Vec::new();

        for pass in 1..=max_passes {
            let snapshot = entries.clone();
            let scope = StaticScope::new(&snapshot);
            let mut substituted = Vec::new();

            for (alias, entry) in &mut entries {
                let resolution = resolve_value(entry, &scope)
                    .with_context(|| format!("Failed to resolve template entry '{alias}'"))?;
                *entry = resolution.value;
                substituted.extend(resolution.substituted);
            }

            if substituted.is_empty() {
                tracing::trace!(passes = pass, "Static template values settled");
                return Ok(Self {
                    entries,
                    base_dir: self.base_dir.clone(),
                });
            }
            pending = substituted;
        }

        pending.sort();
        pending.dedup();
        Err(StackError::StaticResolutionDiverged {
            passes: max_passes,
            pending,
        }
        .into())
    }
}

/// A string inside a static value that references other static values.
struct StaticSite {
    /// Path of the string from the template root
    location: Vec<String>,
    /// Paths of the static values it references
    targets: Vec<Vec<String>>,
}

fn collect_sites(
    value: &Value,
    location: &mut Vec<String>,
    entries: &Map<String, Value>,
    sites: &mut Vec<StaticSite>,
) {
    match value {
        Value::String(text) => {
            let targets: Vec<Vec<String>> = find_references(text)
                .into_iter()
                .filter(|reference| !reference.is_env())
                .filter(|reference| {
                    entries.get(reference.root()).is_some_and(|entry| !is_component_declaration(entry))
                })
                .map(|reference| reference.path)
                .collect();
            if !targets.is_empty() {
                sites.push(StaticSite {
                    location: location.clone(),
                    targets,
                });
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                location.push(index.to_string());
                collect_sites(item, location, entries, sites);
                location.pop();
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                location.push(key.clone());
                collect_sites(item, location, entries, sites);
                location.pop();
            }
        }
        _ => {}
    }
}

/// Cycles among static values, as closed paths of dotted locations.
///
/// A site depends on every other site inside the value it references and on
/// any site that the referenced path passes through.
fn static_reference_cycles(entries: &Map<String, Value>) -> Vec<Vec<String>> {
    let mut sites = Vec::new();
    for (key, entry) in entries {
        if is_component_declaration(entry) {
            continue;
        }
        let mut location = vec![key.clone()];
        collect_sites(entry, &mut location, entries, &mut sites);
    }

    let mut graph = DependencyGraph::new();
    for site in &sites {
        for target in &site.targets {
            for other in &sites {
                if other.location.starts_with(target) || target.starts_with(&other.location) {
                    graph.add_dependency(&site.location.join("."), &other.location.join("."));
                }
            }
        }
    }
    graph.find_cycles()
}
