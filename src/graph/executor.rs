//! Executes a validated dependency graph in parallel rounds.
//!
//! Every round runs all ready components concurrently on the current task with
//! [`futures::future::join_all`]. Inputs are resolved against the outputs of
//! earlier rounds just before each component is invoked. Outputs are recorded
//! only after the whole round settles, so a round never observes its own
//! results. A failed round records its successful siblings and stops the run.

use super::{DependencyGraph, Schedule};
use crate::component::{ComponentDescriptor, ComponentLoader};
use crate::constants::DEPLOY_OPERATION;
use crate::core::{Outcome, Phase, StackError, StatusSink};
use crate::template::reference::{OutputScope, resolve_value};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outputs of completed components, keyed by alias.
pub type OutputsMap = BTreeMap<String, Value>;

/// Runs component graphs through a loader, reporting to a sink.
pub struct GraphExecutor<'a> {
    loader: &'a dyn ComponentLoader,
    sink: &'a dyn StatusSink,
}

impl<'a> GraphExecutor<'a> {
    /// Create an executor.
    pub fn new(loader: &'a dyn ComponentLoader, sink: &'a dyn StatusSink) -> Self {
        Self {
            loader,
            sink,
        }
    }

    /// Deploy every component of `graph`, dependencies first.
    ///
    /// Outputs accumulate in `outputs`, which the caller owns so that partial
    /// results survive a failure. Returns the number of rounds run.
    pub async fn execute(
        &self,
        components: &BTreeMap<String, ComponentDescriptor>,
        graph: &DependencyGraph,
        outputs: &mut OutputsMap,
    ) -> Result<usize> {
        let mut schedule = Schedule::from_graph(graph);
        let mut rounds = 0;

        while !schedule.is_finished() {
            let ready = schedule.ready();
            if ready.is_empty() {
                return Err(StackError::ExecutionStalled {
                    pending: schedule.pending(),
                }
                .into());
            }
            rounds += 1;
            tracing::debug!(round = rounds, components = ?ready, "Starting execution round");

            let results = {
                let settled: &OutputsMap = outputs;
                join_all(ready.iter().map(|alias| async move {
                    (alias, self.run_component(alias, components, settled).await)
                }))
                .await
            };

            let mut failures = Vec::new();
            for (alias, result) in results {
                match result {
                    Ok(value) => {
                        self.sink.outcome(alias, DEPLOY_OPERATION, &Outcome::Succeeded);
                        outputs.insert(alias.clone(), value);
                    }
                    Err(error) => {
                        let error = format!("{error:#}");
                        self.sink.outcome(
                            alias,
                            DEPLOY_OPERATION,
                            &Outcome::Failed {
                                error: error.clone(),
                            },
                        );
                        failures.push((alias.clone(), error));
                    }
                }
            }

            if !failures.is_empty() {
                return Err(StackError::DeploymentFailed {
                    failures,
                }
                .into());
            }

            for alias in &ready {
                schedule.complete(alias);
            }
        }

        Ok(rounds)
    }

    async fn run_component(
        &self,
        alias: &str,
        components: &BTreeMap<String, ComponentDescriptor>,
        outputs: &OutputsMap,
    ) -> Result<Value> {
        let descriptor = components.get(alias).ok_or_else(|| StackError::UnknownAlias {
            alias: alias.to_string(),
        })?;

        let inputs = resolve_value(&descriptor.inputs, &OutputScope::new(outputs))
            .with_context(|| format!("Failed to resolve inputs of '{alias}'"))?
            .value;

        let component = self.loader.load(&descriptor.location, alias).await?;
        self.sink.status(Phase::Deploying, Some(alias));

        match component.deploy(inputs).await? {
            Value::Null => Ok(Value::Object(Map::new())),
            value => Ok(value),
        }
    }
}
