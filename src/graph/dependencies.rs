//! Which components a component's inputs reference.

use crate::core::StackError;
use crate::template::reference::collect_references;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeSet;

/// Collect the component aliases referenced by `inputs`.
///
/// `env` references are skipped. Every other reference must point at a
/// declared component, since static references were substituted before this
/// runs; anything else is [`StackError::UnknownComponent`].
pub fn extract_dependencies(
    alias: &str,
    inputs: &Value,
    declared: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let mut dependencies = BTreeSet::new();
    for reference in collect_references(inputs) {
        if reference.is_env() {
            continue;
        }
        if !declared.contains(reference.root()) {
            return Err(StackError::UnknownComponent {
                expression: reference.expression,
                alias: alias.to_string(),
            }
            .into());
        }
        dependencies.insert(reference.root().to_string());
    }
    Ok(dependencies)
}
