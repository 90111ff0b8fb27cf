use serde_json::json;
use stackweave_cli::constants::{DEPLOY_OPERATION, REMOVE_OPERATION};
use stackweave_cli::core::{Phase, StackError};
use stackweave_cli::deploy::Deployer;
use stackweave_cli::state::{ComponentState, MemoryStateStore, StateStore};
use stackweave_cli::test_utils::{MockLoader, MockLocator, RecordingSink, template};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    loader: MockLoader,
    store: MemoryStateStore,
    sink: RecordingSink,
    deployer: Deployer,
}

fn harness(loader: MockLoader, store: MemoryStateStore) -> Harness {
    let sink = RecordingSink::new();
    let deployer = Deployer::new(
        Arc::new(MockLocator::new()),
        Arc::new(loader.clone()),
        Arc::new(store.clone()),
    )
    .with_sink(Arc::new(sink.clone()));
    Harness {
        loader,
        store,
        sink,
        deployer,
    }
}

fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("missing event '{event}' in {events:?}"))
}

/// Static references are substituted before components run, keeping their type
#[tokio::test]
async fn test_static_reference_feeds_component_inputs() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({
        "a": {"x": 1},
        "b": {"component": "comp", "inputs": {"y": "${a.x}"}}
    }));

    let report = h.deployer.deploy("default", &template).await.unwrap();

    let deploys = h.loader.calls_for(DEPLOY_OPERATION);
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].alias, "b");
    assert_eq!(deploys[0].inputs, json!({"y": 1}));
    assert_eq!(report.rounds, 1);
    assert_eq!(report.outputs.keys().collect::<Vec<_>>(), vec!["b"]);
}

/// A dependent component runs after its dependency and sees its outputs
#[tokio::test]
async fn test_outputs_flow_to_dependents() {
    let loader = MockLoader::new().with_output("db", json!({"url": "postgres://db", "port": 5432}));
    let h = harness(loader, MemoryStateStore::new());
    let template = template(json!({
        "api": {
            "component": "service",
            "inputs": {"database": "${db.url}", "dsn": "${db.url}:${db.url}", "port": "${db.port}"}
        },
        "db": {"component": "postgres"}
    }));

    let report = h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(report.rounds, 2);
    let events = h.loader.events();
    assert!(position(&events, "end db") < position(&events, "start api"));
    let api = &h.loader.calls_for(DEPLOY_OPERATION)[1];
    assert_eq!(api.alias, "api");
    assert_eq!(
        api.inputs,
        json!({"database": "postgres://db", "dsn": "postgres://db:postgres://db", "port": 5432})
    );
    assert_eq!(report.outputs["db"], json!({"url": "postgres://db", "port": 5432}));
}

/// Referencing a bare alias passes the component's whole output
#[tokio::test]
async fn test_whole_output_reference() {
    let loader = MockLoader::new().with_output("c", json!({"id": "c-123", "tags": ["a", "b"]}));
    let h = harness(loader, MemoryStateStore::new());
    let template = template(json!({
        "c": {"component": "X"},
        "d": {"component": "X", "inputs": {"v": "${c}"}}
    }));

    let rounds = h.deployer.plan(&template).await.unwrap();
    assert_eq!(rounds, vec![vec!["c"], vec!["d"]]);

    let report = h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(report.rounds, 2);
    let d = &h.loader.calls_for(DEPLOY_OPERATION)[1];
    assert_eq!(d.alias, "d");
    assert_eq!(d.inputs["v"], report.outputs["c"]);
}

/// Components without dependencies between them run in the same round, concurrently
#[tokio::test]
async fn test_independent_components_run_concurrently() {
    let loader = MockLoader::new()
        .with_delay("a", Duration::from_millis(50))
        .with_delay("b", Duration::from_millis(50))
        .with_delay("c", Duration::from_millis(50));
    let h = harness(loader, MemoryStateStore::new());
    let template = template(json!({
        "a": {"component": "x"},
        "b": {"component": "x"},
        "c": {"component": "x"}
    }));

    let report = h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(h.loader.max_concurrency(), 3);
}

/// Diamond: d waits for both b and c, which both wait for a
#[tokio::test]
async fn test_diamond_runs_in_three_rounds() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({
        "a": {"component": "x"},
        "b": {"component": "x", "inputs": {"from": "${a.alias}"}},
        "c": {"component": "x", "inputs": {"from": "${a.alias}"}},
        "d": {"component": "x", "inputs": {"left": "${b.inputs.from}", "right": "${c.alias}"}}
    }));

    let report = h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(report.rounds, 3);
    let d = h.loader.calls_for(DEPLOY_OPERATION).into_iter().find(|c| c.alias == "d").unwrap();
    assert_eq!(d.inputs, json!({"left": "a", "right": "c"}));
    let events = h.loader.events();
    assert!(position(&events, "end b") < position(&events, "start d"));
    assert!(position(&events, "end c") < position(&events, "start d"));
}

#[tokio::test]
async fn test_debug_messages_in_pipeline_order() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({"a": {"component": "x"}}));

    h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(
        h.sink.debug_messages(),
        vec![
            "Resolving the template's static variables.",
            "Collecting components from the template.",
            "Locating the template's components.",
            "Analyzing the template's components dependencies.",
            "Creating the template's components graph.",
            "Syncing template state.",
            "Executing the template's components graph.",
        ]
    );
    assert_eq!(h.sink.statuses(Phase::Deploying), vec![None, Some("a".to_string())]);
}

/// Stale components are torn down before anything new is deployed
#[tokio::test]
async fn test_stale_components_removed_before_execution() {
    let previous: ComponentState = [("old".to_string(), "legacy".to_string())].into_iter().collect();
    let h = harness(MockLoader::new(), MemoryStateStore::with_state("prod", previous));
    let template = template(json!({"new": {"component": "modern"}}));

    let report = h.deployer.deploy("prod", &template).await.unwrap();

    assert_eq!(report.removed, vec!["old"]);
    let calls = h.loader.calls();
    assert_eq!(calls[0].alias, "old");
    assert_eq!(calls[0].operation, REMOVE_OPERATION);
    assert_eq!(calls[1].alias, "new");
    assert_eq!(calls[1].operation, DEPLOY_OPERATION);

    let expected: ComponentState = [("new".to_string(), "modern".to_string())].into_iter().collect();
    assert_eq!(h.store.get_state("prod").await.unwrap(), expected);
}

/// A failed component stops later rounds but its siblings still finish
#[tokio::test]
async fn test_round_failure_stops_later_rounds() {
    let loader = MockLoader::new().with_failure("a");
    let h = harness(loader, MemoryStateStore::new());
    let template = template(json!({
        "a": {"component": "x"},
        "b": {"component": "x"},
        "c": {"component": "x", "inputs": {"after": "${b.alias}"}}
    }));

    let err = h.deployer.deploy("default", &template).await.unwrap_err();

    match err.downcast_ref::<StackError>() {
        Some(StackError::DeploymentFailed {
            failures,
        }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "a");
            assert!(failures[0].1.contains("a failed during deploy"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.loader.aliases_for(DEPLOY_OPERATION), vec!["a", "b"]);
    // State was committed during reconciliation, before execution started
    assert_eq!(h.store.commits().len(), 1);
}

#[tokio::test]
async fn test_cycle_rejected_before_anything_runs() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({
        "a": {"component": "x", "inputs": {"v": "${b.out}"}},
        "b": {"component": "x", "inputs": {"v": "${a.out}"}},
        "c": {"component": "x"}
    }));

    let err = h.deployer.deploy("default", &template).await.unwrap_err();

    match err.downcast_ref::<StackError>() {
        Some(StackError::CircularDependency {
            cycles,
        }) => {
            assert_eq!(cycles, &vec![vec!["a".to_string(), "b".to_string(), "a".to_string()]]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("Your template has circular dependencies:"));
    assert!(message.contains("a → b → a"));
    assert!(h.loader.calls().is_empty());
    assert!(h.store.commits().is_empty());
}

#[tokio::test]
async fn test_self_reference_is_a_cycle() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({"a": {"component": "x", "inputs": {"v": "${a.out}"}}}));

    let err = h.deployer.deploy("default", &template).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StackError>(),
        Some(StackError::CircularDependency { cycles }) if cycles == &vec![vec!["a".to_string(), "a".to_string()]]
    ));
}

#[tokio::test]
async fn test_misspelled_reference_suggests_key() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({
        "bucket": {"component": "s3"},
        "site": {"component": "web", "inputs": {"bucket": "${bukcet.arn}"}}
    }));

    let err = h.deployer.deploy("default", &template).await.unwrap_err();

    match err.downcast_ref::<StackError>() {
        Some(StackError::UnknownReference {
            root,
            suggestions,
            ..
        }) => {
            assert_eq!(root, "bukcet");
            assert_eq!(suggestions, &vec!["bucket".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.loader.calls().is_empty());
}

#[tokio::test]
async fn test_env_reference_resolved_statically() {
    let path = std::env::var("PATH").expect("PATH is set in the test environment");
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({"a": {"component": "x", "inputs": {"path": "${env.PATH}"}}}));

    h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(h.loader.calls()[0].inputs, json!({"path": path}));
}

#[tokio::test]
async fn test_unset_env_reference_is_an_error() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({
        "a": {"component": "x", "inputs": {"v": "${env.STACKWEAVE_TEST_SURELY_UNSET_3F9A}"}}
    }));

    let err = h.deployer.deploy("default", &template).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StackError>(),
        Some(StackError::UnresolvedReference { .. })
    ));
}

#[tokio::test]
async fn test_self_referential_static_values_rejected() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({"x": "${y}-${y}", "y": "${x}", "a": {"component": "c"}}));

    let err = h.deployer.deploy("default", &template).await.unwrap_err();

    match err.downcast_ref::<StackError>() {
        Some(StackError::CircularStaticReference {
            cycles,
        }) => assert_eq!(cycles, &vec![vec!["x".to_string(), "y".to_string(), "x".to_string()]]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.loader.calls().is_empty());
}

#[tokio::test]
async fn test_long_static_chain_exceeding_pass_limit_diverges() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let deployer = h.deployer.with_max_resolution_passes(1);
    let template = template(json!({"x": "${y}", "y": "${z}", "z": "end", "a": {"component": "c"}}));

    let err = deployer.deploy("default", &template).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StackError>(),
        Some(StackError::StaticResolutionDiverged { passes: 1, .. })
    ));
}

#[tokio::test]
async fn test_invalid_instance_id_rejected() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({"a": {"component": "x"}}));

    let err = h.deployer.deploy("../escape", &template).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<StackError>(), Some(StackError::InvalidInstanceId { .. })));
    assert!(h.loader.calls().is_empty());
}

#[tokio::test]
async fn test_null_outputs_become_empty_object() {
    let loader = MockLoader::new()
        .with_output("a", serde_json::Value::Null)
        .with_output("b", json!(false));
    let h = harness(loader, MemoryStateStore::new());
    let template = template(json!({"a": {"component": "x"}, "b": {"component": "x"}}));

    let report = h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(report.outputs["a"], json!({}));
    assert_eq!(report.outputs["b"], json!(false));
}

#[tokio::test]
async fn test_empty_template_deploys_nothing() {
    let previous: ComponentState = [("a".to_string(), "x".to_string())].into_iter().collect();
    let h = harness(MockLoader::new(), MemoryStateStore::with_state("default", previous));
    let template = template(json!({"region": "eu-west-1"}));

    let report = h.deployer.deploy("default", &template).await.unwrap();

    assert_eq!(report.rounds, 0);
    assert!(report.outputs.is_empty());
    assert_eq!(report.removed, vec!["a"]);
}

#[tokio::test]
async fn test_plan_reports_rounds_without_side_effects() {
    let h = harness(MockLoader::new(), MemoryStateStore::new());
    let template = template(json!({
        "web": {"component": "x", "inputs": {"db": "${db.url}", "cache": "${cache.url}"}},
        "db": {"component": "x"},
        "cache": {"component": "x"},
        "cdn": {"component": "x", "inputs": {"origin": "${web.url}"}}
    }));

    let rounds = h.deployer.plan(&template).await.unwrap();

    assert_eq!(rounds, vec![vec!["cache", "db"], vec!["web"], vec!["cdn"]]);
    assert!(h.loader.calls().is_empty());
    assert!(h.store.commits().is_empty());
}

#[tokio::test]
async fn test_remove_tears_down_everything() {
    let previous: ComponentState =
        [("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())]
            .into_iter()
            .collect();
    let h = harness(MockLoader::new(), MemoryStateStore::with_state("prod", previous));

    let report = h.deployer.remove("prod", std::path::Path::new("/project")).await.unwrap();

    assert_eq!(report.removed, vec!["a", "b"]);
    assert_eq!(h.loader.aliases_for(REMOVE_OPERATION).len(), 2);
    assert!(h.store.get_state("prod").await.unwrap().is_empty());
    assert_eq!(h.sink.statuses(Phase::Removing)[0], None);
}
