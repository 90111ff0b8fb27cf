//! Persisted deployment state
//!
//! State records which components the last successful run of a deployment
//! instance left behind, as a mapping from alias to component reference. It is
//! read at the start of a run and fully overwritten once every stale component
//! has been torn down (see [`reconcile`]).
//!
//! Two stores are provided:
//!
//! - [`file::FileStateStore`] - one TOML file per instance, written atomically
//!   under a cross-process lock
//! - [`memory::MemoryStateStore`] - in-process, for embedding and tests

pub mod file;
pub mod lock;
pub mod memory;
pub mod reconcile;

use crate::core::StackError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use reconcile::{ReconcileReport, Reconciler};

/// Alias → component reference of the last committed run.
pub type ComponentState = BTreeMap<String, String>;

/// Storage for deployment state, keyed by instance id.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The committed state of `instance`; empty if it was never deployed.
    async fn get_state(&self, instance: &str) -> Result<ComponentState>;

    /// Replace the committed state of `instance`.
    async fn commit_state(&self, instance: &str, components: &ComponentState) -> Result<()>;
}

/// Instance ids become file names, so only `[A-Za-z0-9_.-]+` is accepted
/// (and not `.` or `..`).
pub fn validate_instance_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StackError::InvalidInstanceId {
            id: id.to_string(),
        }
        .into())
    }
}
