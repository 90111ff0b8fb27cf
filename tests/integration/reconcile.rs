use serde_json::json;
use stackweave_cli::constants::{DEPLOY_OPERATION, REMOVE_OPERATION};
use stackweave_cli::core::StackError;
use stackweave_cli::deploy::Deployer;
use stackweave_cli::state::{ComponentState, FileStateStore, MemoryStateStore, StateStore};
use stackweave_cli::test_utils::{MockLoader, MockLocator, template};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn state(pairs: &[(&str, &str)]) -> ComponentState {
    pairs.iter().map(|(a, r)| (a.to_string(), r.to_string())).collect()
}

/// Re-deploying a shrunk template removes exactly the dropped component
#[tokio::test]
async fn test_shrinking_template_removes_dropped_component() {
    let store = MemoryStateStore::with_state("default", state(&[("a", "X"), ("b", "Y")]));
    let loader = MockLoader::new();
    let deployer =
        Deployer::new(Arc::new(MockLocator::new()), Arc::new(loader.clone()), Arc::new(store.clone()));

    let report =
        deployer.deploy("default", &template(json!({"a": {"component": "X"}}))).await.unwrap();

    assert_eq!(report.removed, vec!["b"]);
    assert_eq!(loader.aliases_for(REMOVE_OPERATION), vec!["b"]);
    assert_eq!(loader.aliases_for(DEPLOY_OPERATION), vec!["a"]);
    assert_eq!(store.get_state("default").await.unwrap(), state(&[("a", "X")]));
}

/// Stale components are torn down concurrently, not one after another
#[tokio::test]
async fn test_stale_teardowns_run_concurrently() {
    let store = MemoryStateStore::with_state("default", state(&[("a", "X"), ("b", "Y"), ("c", "Z")]));
    let loader = MockLoader::new()
        .with_delay("b", Duration::from_millis(50))
        .with_delay("c", Duration::from_millis(50));
    let deployer =
        Deployer::new(Arc::new(MockLocator::new()), Arc::new(loader.clone()), Arc::new(store.clone()));

    let report =
        deployer.deploy("default", &template(json!({"a": {"component": "X"}}))).await.unwrap();

    assert_eq!(report.removed, vec!["b", "c"]);
    let mut removed = loader.aliases_for(REMOVE_OPERATION);
    removed.sort();
    assert_eq!(removed, vec!["b", "c"]);
    assert_eq!(loader.max_concurrency(), 2);
}

/// A failed teardown aborts the deployment and keeps the old state for a retry
#[tokio::test]
async fn test_failed_teardown_aborts_deploy() {
    let previous = state(&[("a", "X"), ("b", "Y")]);
    let store = MemoryStateStore::with_state("default", previous.clone());
    let loader = MockLoader::new().with_failure("b");
    let deployer =
        Deployer::new(Arc::new(MockLocator::new()), Arc::new(loader.clone()), Arc::new(store.clone()));

    let err =
        deployer.deploy("default", &template(json!({"a": {"component": "X"}}))).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<StackError>(), Some(StackError::TeardownFailed { .. })));
    assert!(loader.calls_for(DEPLOY_OPERATION).is_empty());
    assert_eq!(store.get_state("default").await.unwrap(), previous);
}

/// Instances are tracked independently
#[tokio::test]
async fn test_instances_do_not_interfere() {
    let store = MemoryStateStore::new();
    let loader = MockLoader::new();
    let deployer =
        Deployer::new(Arc::new(MockLocator::new()), Arc::new(loader.clone()), Arc::new(store.clone()));
    let full = template(json!({"a": {"component": "X"}, "b": {"component": "Y"}}));

    deployer.deploy("staging", &full).await.unwrap();
    deployer.deploy("prod", &full).await.unwrap();
    let report = deployer.deploy("staging", &template(json!({"a": {"component": "X"}}))).await.unwrap();

    assert_eq!(report.removed, vec!["b"]);
    assert_eq!(store.get_state("prod").await.unwrap(), state(&[("a", "X"), ("b", "Y")]));
}

/// File-backed state survives across deployer instances
#[tokio::test]
async fn test_file_state_persists_between_runs() {
    let dir = TempDir::new().unwrap();
    let loader = MockLoader::new();
    let build = || {
        Deployer::new(
            Arc::new(MockLocator::new()),
            Arc::new(loader.clone()),
            Arc::new(FileStateStore::new(dir.path())),
        )
    };

    build()
        .deploy("default", &template(json!({"a": {"component": "X"}, "b": {"component": "Y"}})))
        .await
        .unwrap();
    let report = build().remove("default", dir.path()).await.unwrap();

    assert_eq!(report.removed, vec!["a", "b"]);
    let store = FileStateStore::new(dir.path());
    assert!(store.get_state("default").await.unwrap().is_empty());
}
