//! Test utilities for Stackweave
//!
//! In-memory stand-ins for every collaborator of the deployment pipeline, so
//! tests can drive a [`crate::deploy::Deployer`] without touching processes or
//! the file system:
//!
//! - [`MockLocator`] - resolves any component reference to a fake directory
//! - [`MockLoader`] - loads [`MockComponent`]s that record every call and can be
//!   told to fail, delay or return fixed outputs
//! - [`RecordingSink`] - records every status event
//!
//! ```rust,no_run
//! use stackweave_cli::test_utils::{MockLoader, template};
//! use serde_json::json;
//!
//! let loader = MockLoader::new().with_failure("db");
//! let template = template(json!({"db": {"component": "postgres"}}));
//! ```

use crate::component::{Component, ComponentLoader, ComponentLocator};
use crate::constants::{DEPLOY_OPERATION, REMOVE_OPERATION};
use crate::core::{Outcome, Phase, StackError, StatusSink};
use crate::template::Template;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, otherwise `RUST_LOG`; does nothing if neither is set.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A template rooted at `/project`.
pub fn template(value: Value) -> Template {
    Template::new(value, "/project").unwrap_or_else(|e| panic!("invalid test template: {e}"))
}

/// Resolves every reference to `/components/<ref>`, except those marked missing.
#[derive(Debug, Clone, Default)]
pub struct MockLocator {
    missing: HashSet<String>,
}

impl MockLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `reference` fail to resolve.
    pub fn with_missing(mut self, reference: &str) -> Self {
        self.missing.insert(reference.to_string());
        self
    }
}

#[async_trait]
impl ComponentLocator for MockLocator {
    async fn resolve_component_refs(
        &self,
        refs: &[String],
        _base_dir: &Path,
    ) -> Result<HashMap<String, PathBuf>> {
        refs.iter()
            .map(|reference| {
                if self.missing.contains(reference) {
                    Err(StackError::ComponentNotFound {
                        reference: reference.clone(),
                        searched: vec!["/components".to_string()],
                    }
                    .into())
                } else {
                    Ok((reference.clone(), Path::new("/components").join(reference)))
                }
            })
            .collect()
    }
}

/// One recorded component operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub alias: String,
    pub operation: String,
    pub inputs: Value,
    pub location: PathBuf,
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<MockCall>>,
    events: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Loader for [`MockComponent`]s. Clones share their recordings.
#[derive(Clone, Default)]
pub struct MockLoader {
    failing: HashSet<String>,
    outputs: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    operations: HashMap<String, Vec<String>>,
    state: Arc<MockState>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation of `alias` fails.
    pub fn with_failure(mut self, alias: &str) -> Self {
        self.failing.insert(alias.to_string());
        self
    }

    /// `alias` deploys to `outputs` instead of echoing its inputs.
    pub fn with_output(mut self, alias: &str, outputs: Value) -> Self {
        self.outputs.insert(alias.to_string(), outputs);
        self
    }

    /// Every operation of `alias` sleeps for `delay` first.
    pub fn with_delay(mut self, alias: &str, delay: Duration) -> Self {
        self.delays.insert(alias.to_string(), delay);
        self
    }

    /// Custom operations `alias` supports besides deploy and remove.
    pub fn with_operations(mut self, alias: &str, operations: &[&str]) -> Self {
        self.operations
            .insert(alias.to_string(), operations.iter().map(|op| op.to_string()).collect());
        self
    }

    /// Every call made so far, in start order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Calls of `operation`, in start order.
    pub fn calls_for(&self, operation: &str) -> Vec<MockCall> {
        self.calls().into_iter().filter(|call| call.operation == operation).collect()
    }

    /// Aliases that ran `operation`, in start order.
    pub fn aliases_for(&self, operation: &str) -> Vec<String> {
        self.calls_for(operation).into_iter().map(|call| call.alias).collect()
    }

    /// `start <alias>` / `end <alias>` markers in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Highest number of operations that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComponentLoader for MockLoader {
    async fn load(&self, location: &Path, alias: &str) -> Result<Box<dyn Component>> {
        Ok(Box::new(MockComponent {
            alias: alias.to_string(),
            location: location.to_path_buf(),
            fail: self.failing.contains(alias),
            output: self.outputs.get(alias).cloned(),
            delay: self.delays.get(alias).copied(),
            operations: self.operations.get(alias).cloned().unwrap_or_default(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Component that records its calls; see [`MockLoader`].
pub struct MockComponent {
    alias: String,
    location: PathBuf,
    fail: bool,
    output: Option<Value>,
    delay: Option<Duration>,
    operations: Vec<String>,
    state: Arc<MockState>,
}

impl MockComponent {
    fn push_event(&self, event: String) {
        if let Ok(mut events) = self.state.events.lock() {
            events.push(event);
        }
    }

    async fn run(&self, operation: &str, inputs: Value) -> Result<Value> {
        if let Ok(mut calls) = self.state.calls.lock() {
            calls.push(MockCall {
                alias: self.alias.clone(),
                operation: operation.to_string(),
                inputs: inputs.clone(),
                location: self.location.clone(),
            });
        }
        self.push_event(format!("start {}", self.alias));
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.push_event(format!("end {}", self.alias));

        if self.fail {
            anyhow::bail!("{} failed during {operation}", self.alias);
        }
        Ok(match (&self.output, operation) {
            (Some(output), DEPLOY_OPERATION) => output.clone(),
            _ => json!({"alias": self.alias, "operation": operation, "inputs": inputs}),
        })
    }
}

#[async_trait]
impl Component for MockComponent {
    async fn deploy(&self, inputs: Value) -> Result<Value> {
        self.run(DEPLOY_OPERATION, inputs).await
    }

    async fn remove(&self) -> Result<()> {
        self.run(REMOVE_OPERATION, json!({})).await.map(|_| ())
    }

    fn supports(&self, operation: &str) -> bool {
        operation == DEPLOY_OPERATION
            || operation == REMOVE_OPERATION
            || self.operations.iter().any(|op| op == operation)
    }

    async fn call(&self, operation: &str, inputs: Value) -> Result<Value> {
        if !self.supports(operation) {
            return Err(StackError::OperationNotSupported {
                alias: self.alias.clone(),
                operation: operation.to_string(),
            }
            .into());
        }
        self.run(operation, inputs).await
    }
}

/// A status event seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Status(Phase, Option<String>),
    Debug(String),
    Outcome(String, String, Outcome),
}

/// Sink that keeps every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Debug messages, in order.
    pub fn debug_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Debug(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Aliases reported in `phase`, in order. The template-wide event is `None`.
    pub fn statuses(&self, phase: Phase) -> Vec<Option<String>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Status(p, alias) if p == phase => Some(alias),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, phase: Phase, alias: Option<&str>) {
        self.push(SinkEvent::Status(phase, alias.map(str::to_string)));
    }

    fn debug(&self, message: &str) {
        self.push(SinkEvent::Debug(message.to_string()));
    }

    fn outcome(&self, alias: &str, operation: &str, outcome: &Outcome) {
        self.push(SinkEvent::Outcome(alias.to_string(), operation.to_string(), outcome.clone()));
    }
}
