//! In-process state store.

use super::{ComponentState, StateStore, validate_instance_id};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keeps state in memory. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: Arc<Mutex<HashMap<String, ComponentState>>>,
    commits: Arc<Mutex<Vec<(String, ComponentState)>>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with `components` already committed for `instance`.
    pub fn with_state(instance: &str, components: ComponentState) -> Self {
        let store = Self::new();
        if let Ok(mut states) = store.states.lock() {
            states.insert(instance.to_string(), components);
        }
        store
    }

    /// Every commit made through this store, oldest first.
    pub fn commits(&self) -> Vec<(String, ComponentState)> {
        self.commits.lock().map(|commits| commits.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(&self, instance: &str) -> Result<ComponentState> {
        validate_instance_id(instance)?;
        let states = self.states.lock().map_err(|_| anyhow::anyhow!("State store lock poisoned"))?;
        Ok(states.get(instance).cloned().unwrap_or_default())
    }

    async fn commit_state(&self, instance: &str, components: &ComponentState) -> Result<()> {
        validate_instance_id(instance)?;
        self.states
            .lock()
            .map_err(|_| anyhow::anyhow!("State store lock poisoned"))?
            .insert(instance.to_string(), components.clone());
        self.commits
            .lock()
            .map_err(|_| anyhow::anyhow!("State store lock poisoned"))?
            .push((instance.to_string(), components.clone()));
        Ok(())
    }
}
