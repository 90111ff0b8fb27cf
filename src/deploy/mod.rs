//! Deployment orchestration
//!
//! [`Deployer`] ties the pipeline together:
//!
//! 1. Resolve static template values
//! 2. Collect component declarations and locate their implementations
//! 3. Extract dependencies and build a validated graph
//! 4. Tear down components that left the template and commit the new state
//! 5. Execute the graph in parallel rounds
//!
//! Steps 1-3 are side-effect free and exposed as [`Deployer::prepare`] and
//! [`Deployer::plan`]. Custom operations are dispatched by [`Deployer::invoke`].

pub mod dispatch;

use crate::component::{ComponentDescriptor, ComponentLoader, ComponentLocator};
use crate::constants::DEFAULT_MAX_RESOLUTION_PASSES;
use crate::core::{Phase, StatusSink, TracingSink};
use crate::graph::dependencies::extract_dependencies;
use crate::graph::{DependencyGraph, GraphExecutor, OutputsMap, plan_rounds};
use crate::state::{
    ComponentState, ReconcileReport, Reconciler, StateStore, validate_instance_id,
};
use crate::template::Template;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// A template that passed every check and is ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedDeployment {
    /// Component descriptors keyed by alias
    pub components: BTreeMap<String, ComponentDescriptor>,
    /// Validated, acyclic dependency graph
    pub graph: DependencyGraph,
}

impl PreparedDeployment {
    /// Alias → component reference, as it will be committed to state.
    pub fn desired_state(&self) -> ComponentState {
        self.components
            .iter()
            .map(|(alias, descriptor)| (alias.clone(), descriptor.component_ref.clone()))
            .collect()
    }
}

/// What a deployment did.
#[derive(Debug, Clone, Default)]
pub struct DeploymentReport {
    /// Outputs of every component, keyed by alias
    pub outputs: OutputsMap,
    /// Components torn down because they left the template
    pub removed: Vec<String>,
    /// Number of execution rounds
    pub rounds: usize,
}

/// Deploys, removes, plans and drives templates.
pub struct Deployer {
    locator: Arc<dyn ComponentLocator>,
    loader: Arc<dyn ComponentLoader>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn StatusSink>,
    max_resolution_passes: usize,
}

impl Deployer {
    /// Create a deployer reporting through [`TracingSink`].
    pub fn new(
        locator: Arc<dyn ComponentLocator>,
        loader: Arc<dyn ComponentLoader>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            locator,
            loader,
            store,
            sink: Arc::new(TracingSink),
            max_resolution_passes: DEFAULT_MAX_RESOLUTION_PASSES,
        }
    }

    /// Report progress through `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Bound static resolution to `passes` passes.
    #[must_use]
    pub fn with_max_resolution_passes(mut self, passes: usize) -> Self {
        self.max_resolution_passes = passes;
        self
    }

    /// Run every check that does not touch components or state.
    pub async fn prepare(&self, template: &Template) -> Result<PreparedDeployment> {
        self.sink.debug("Resolving the template's static variables.");
        let resolved = template.resolve_static(self.max_resolution_passes)?;

        self.sink.debug("Collecting components from the template.");
        let declarations = resolved.component_declarations()?;

        self.sink.debug("Locating the template's components.");
        let refs: Vec<String> =
            declarations.values().map(|declaration| declaration.component.clone()).collect();
        let locations = self.locator.resolve_component_refs(&refs, &resolved.base_dir).await?;

        self.sink.debug("Analyzing the template's components dependencies.");
        let declared: BTreeSet<String> = declarations.keys().cloned().collect();
        let mut components = BTreeMap::new();
        for (alias, declaration) in declarations {
            let dependencies = extract_dependencies(&alias, &declaration.inputs, &declared)?;
            let location = locations
                .get(&declaration.component)
                .cloned()
                .with_context(|| format!("Component '{}' was not located", declaration.component))?;
            components.insert(
                alias.clone(),
                ComponentDescriptor {
                    alias,
                    component_ref: declaration.component,
                    location,
                    inputs: declaration.inputs,
                    dependencies,
                },
            );
        }

        self.sink.debug("Creating the template's components graph.");
        let graph = DependencyGraph::from_components(&components);
        graph.validate()?;

        Ok(PreparedDeployment {
            components,
            graph,
        })
    }

    /// Deploy `template` as `instance`.
    pub async fn deploy(&self, instance: &str, template: &Template) -> Result<DeploymentReport> {
        validate_instance_id(instance)?;
        self.sink.status(Phase::Deploying, None);

        let prepared = self.prepare(template).await?;

        self.sink.debug("Syncing template state.");
        let reconciled = self
            .reconciler()
            .reconcile(instance, &prepared.desired_state(), &template.base_dir)
            .await?;

        self.sink.debug("Executing the template's components graph.");
        let executor = GraphExecutor::new(&*self.loader, &*self.sink);
        let mut outputs = OutputsMap::new();
        let rounds = executor.execute(&prepared.components, &prepared.graph, &mut outputs).await?;

        tracing::info!(
            instance = %instance,
            components = outputs.len(),
            removed = reconciled.removed.len(),
            rounds,
            "Deployment complete"
        );
        Ok(DeploymentReport {
            outputs,
            removed: reconciled.removed,
            rounds,
        })
    }

    /// Tear down everything recorded for `instance`.
    ///
    /// Local component references recorded in state resolve against `base_dir`.
    pub async fn remove(&self, instance: &str, base_dir: &Path) -> Result<ReconcileReport> {
        validate_instance_id(instance)?;
        self.sink.status(Phase::Removing, None);

        self.sink.debug("Syncing template state.");
        let report = self.reconciler().reconcile(instance, &ComponentState::new(), base_dir).await?;

        tracing::info!(instance = %instance, removed = report.removed.len(), "Removal complete");
        Ok(report)
    }

    /// The rounds `deploy` would run, without running anything.
    pub async fn plan(&self, template: &Template) -> Result<Vec<Vec<String>>> {
        let prepared = self.prepare(template).await?;
        plan_rounds(&prepared.graph)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&*self.locator, &*self.loader, &*self.store, &*self.sink)
    }
}
