//! Custom operations on deployed components.
//!
//! `stackweave invoke rotate --alias key` runs the `rotate` operation of the
//! `key` component. Every targeted component must support the operation before
//! any of them is invoked, so a typo never leaves a batch half-applied.

use super::Deployer;
use crate::core::{Outcome, Phase, StackError};
use crate::template::Template;
use anyhow::Result;
use futures::future::{join_all, try_join_all};
use serde_json::Value;
use std::collections::BTreeMap;

impl Deployer {
    /// Run `operation` on the components named in `aliases` (every component when empty).
    ///
    /// The same `inputs` are passed to each component. Returns each component's
    /// result keyed by alias.
    pub async fn invoke(
        &self,
        template: &Template,
        operation: &str,
        aliases: &[String],
        inputs: Value,
    ) -> Result<BTreeMap<String, Value>> {
        let resolved = template.resolve_static(self.max_resolution_passes)?;
        let declarations = resolved.component_declarations()?;

        let targets: Vec<String> = if aliases.is_empty() {
            declarations.keys().cloned().collect()
        } else {
            let mut targets = Vec::with_capacity(aliases.len());
            for alias in aliases {
                if !declarations.contains_key(alias) {
                    return Err(StackError::UnknownAlias {
                        alias: alias.clone(),
                    }
                    .into());
                }
                if !targets.contains(alias) {
                    targets.push(alias.clone());
                }
            }
            targets
        };

        let refs: Vec<String> = targets
            .iter()
            .filter_map(|alias| declarations.get(alias).map(|d| d.component.clone()))
            .collect();
        let locations = self.locator.resolve_component_refs(&refs, &resolved.base_dir).await?;

        let components = try_join_all(targets.iter().map(|alias| {
            let location = declarations
                .get(alias)
                .and_then(|declaration| locations.get(&declaration.component))
                .cloned();
            async move {
                let location = location.ok_or_else(|| StackError::UnknownAlias {
                    alias: alias.clone(),
                })?;
                let component = self.loader.load(&location, alias).await?;
                Ok::<_, anyhow::Error>((alias, component))
            }
        }))
        .await?;

        let mut unsupported: Vec<String> = components
            .iter()
            .filter(|(_, component)| !component.supports(operation))
            .map(|(alias, _)| (*alias).clone())
            .collect();
        if !unsupported.is_empty() {
            unsupported.sort();
            return Err(StackError::UnsupportedOperation {
                operation: operation.to_string(),
                aliases: unsupported,
            }
            .into());
        }

        let results = join_all(components.iter().map(|(alias, component)| {
            let inputs = inputs.clone();
            async move {
                self.sink.status(Phase::Invoking, Some(alias.as_str()));
                (*alias, component.call(operation, inputs).await)
            }
        }))
        .await;

        let mut outputs = BTreeMap::new();
        let mut failures = Vec::new();
        for (alias, result) in results {
            match result {
                Ok(value) => {
                    self.sink.outcome(alias, operation, &Outcome::Succeeded);
                    outputs.insert(alias.clone(), value);
                }
                Err(error) => {
                    let error = format!("{error:#}");
                    self.sink.outcome(
                        alias,
                        operation,
                        &Outcome::Failed {
                            error: error.clone(),
                        },
                    );
                    failures.push((alias.clone(), error));
                }
            }
        }

        if !failures.is_empty() {
            return Err(StackError::InvocationFailed {
                operation: operation.to_string(),
                failures,
            }
            .into());
        }
        Ok(outputs)
    }
}
