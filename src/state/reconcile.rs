//! Reconciles persisted state with the desired set of components.
//!
//! Components recorded for an instance but absent from the new desired set are
//! stale. They are torn down concurrently, and only when every teardown succeeds
//! is the desired set committed. A failed teardown leaves the previous state in
//! place so the next run retries it.

use super::{ComponentState, StateStore};
use crate::component::{ComponentLoader, ComponentLocator};
use crate::constants::REMOVE_OPERATION;
use crate::core::{Outcome, Phase, StackError, StatusSink};
use anyhow::{Context, Result};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Aliases that were torn down
    pub removed: Vec<String>,
    /// Aliases present both before and after
    pub retained: Vec<String>,
}

/// Tears down stale components and commits the desired state.
pub struct Reconciler<'a> {
    locator: &'a dyn ComponentLocator,
    loader: &'a dyn ComponentLoader,
    store: &'a dyn StateStore,
    sink: &'a dyn StatusSink,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over the given collaborators.
    pub fn new(
        locator: &'a dyn ComponentLocator,
        loader: &'a dyn ComponentLoader,
        store: &'a dyn StateStore,
        sink: &'a dyn StatusSink,
    ) -> Self {
        Self {
            locator,
            loader,
            store,
            sink,
        }
    }

    /// Bring `instance` in line with `desired`.
    ///
    /// Stale component references are located relative to `base_dir`. An empty
    /// `desired` set removes everything.
    pub async fn reconcile(
        &self,
        instance: &str,
        desired: &ComponentState,
        base_dir: &Path,
    ) -> Result<ReconcileReport> {
        let previous = self.store.get_state(instance).await?;

        let stale: BTreeMap<&String, &String> =
            previous.iter().filter(|(alias, _)| !desired.contains_key(*alias)).collect();
        let retained: Vec<String> =
            previous.keys().filter(|alias| desired.contains_key(*alias)).cloned().collect();

        if !stale.is_empty() {
            tracing::debug!(instance = %instance, stale = ?stale.keys().collect::<Vec<_>>(), "Removing stale components");

            let refs: Vec<String> = stale.values().map(|r| (*r).clone()).collect();
            let locations = self
                .locator
                .resolve_component_refs(&refs, base_dir)
                .await
                .context("Failed to locate components recorded in the previous deployment")?;

            let results = join_all(stale.iter().map(|(alias, component_ref)| {
                let location = locations.get(*component_ref).cloned();
                async move { (*alias, self.teardown(alias, component_ref, location).await) }
            }))
            .await;

            let mut failures = Vec::new();
            for (alias, result) in results {
                match result {
                    Ok(()) => self.sink.outcome(alias, REMOVE_OPERATION, &Outcome::Succeeded),
                    Err(error) => {
                        let error = format!("{error:#}");
                        self.sink.outcome(
                            alias,
                            REMOVE_OPERATION,
                            &Outcome::Failed {
                                error: error.clone(),
                            },
                        );
                        failures.push((alias.clone(), error));
                    }
                }
            }

            if !failures.is_empty() {
                return Err(StackError::TeardownFailed {
                    failures,
                }
                .into());
            }
        }

        self.store.commit_state(instance, desired).await?;

        Ok(ReconcileReport {
            removed: stale.keys().map(|alias| (*alias).clone()).collect(),
            retained,
        })
    }

    async fn teardown(
        &self,
        alias: &str,
        component_ref: &str,
        location: Option<PathBuf>,
    ) -> Result<()> {
        let location = location.ok_or_else(|| StackError::ComponentNotFound {
            reference: component_ref.to_string(),
            searched: Vec::new(),
        })?;
        let component = self.loader.load(&location, alias).await?;
        self.sink.status(Phase::Removing, Some(alias));
        component.remove().await
    }
}
