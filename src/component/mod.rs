//! Components: the units a template deploys
//!
//! A component is located by a [`locator::ComponentLocator`], loaded by a
//! [`ComponentLoader`] and then driven through the [`Component`] trait. The
//! default implementations run components as local processes
//! ([`process::ProcessLoader`]); tests and embedders supply their own.

pub mod locator;
pub mod process;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use locator::{ComponentLocator, FsLocator};
pub use process::ProcessLoader;

/// A loaded component instance.
#[async_trait]
pub trait Component: Send + Sync {
    /// Run the default operation with resolved inputs and return its outputs.
    async fn deploy(&self, inputs: Value) -> Result<Value>;

    /// Tear the component down.
    async fn remove(&self) -> Result<()>;

    /// Whether [`Component::call`] accepts `operation`.
    fn supports(&self, operation: &str) -> bool;

    /// Run a named operation.
    ///
    /// Implementations return [`crate::core::StackError::OperationNotSupported`]
    /// for operations they do not implement.
    async fn call(&self, operation: &str, inputs: Value) -> Result<Value>;
}

/// Turns a component location into a runnable [`Component`].
#[async_trait]
pub trait ComponentLoader: Send + Sync {
    /// Load the component found at `location` under the name `alias`.
    async fn load(&self, location: &Path, alias: &str) -> Result<Box<dyn Component>>;
}

/// Everything the executor needs to know about one component of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDescriptor {
    /// Template key of the component
    pub alias: String,
    /// Component reference as written in the template
    pub component_ref: String,
    /// Resolved directory of the implementation
    pub location: PathBuf,
    /// Statically resolved inputs, possibly still holding references to other components
    pub inputs: Value,
    /// Aliases whose outputs the inputs reference
    pub dependencies: BTreeSet<String>,
}
