//! Property tests for dependency ordering on random acyclic templates.

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use stackweave_cli::constants::DEPLOY_OPERATION;
use stackweave_cli::deploy::Deployer;
use stackweave_cli::state::MemoryStateStore;
use stackweave_cli::test_utils::{MockLoader, MockLocator, template};
use std::sync::Arc;

/// Template where `c{i}` depends on `c{j}` for every `j < i` whose edge flag is set.
fn dag_template(size: usize, edges: &[bool]) -> (Value, Vec<(String, String)>) {
    let mut entries = Map::new();
    let mut dependencies = Vec::new();
    for i in 0..size {
        let mut inputs = Map::new();
        for j in 0..i {
            if edges[i * size + j] {
                inputs.insert(format!("from_c{j}"), json!(format!("${{c{j}.alias}}")));
                dependencies.push((format!("c{i}"), format!("c{j}")));
            }
        }
        entries.insert(format!("c{i}"), json!({"component": "node", "inputs": inputs}));
    }
    (Value::Object(entries), dependencies)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: every component starts only after all of its dependencies finished,
    /// and sees their outputs.
    #[test]
    fn property_dependencies_finish_before_dependents(
        (size, edges) in (1usize..8).prop_flat_map(|n| (Just(n), proptest::collection::vec(any::<bool>(), n * n)))
    ) {
        let (value, dependencies) = dag_template(size, &edges);
        let loader = MockLoader::new();
        let deployer = Deployer::new(
            Arc::new(MockLocator::new()),
            Arc::new(loader.clone()),
            Arc::new(MemoryStateStore::new()),
        );

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let report = runtime.block_on(deployer.deploy("default", &template(value))).unwrap();

        prop_assert_eq!(report.outputs.len(), size);
        let mut deployed = loader.aliases_for(DEPLOY_OPERATION);
        prop_assert_eq!(deployed.len(), size);
        deployed.sort();
        deployed.dedup();
        prop_assert_eq!(deployed.len(), size, "each component deployed exactly once");
        let events = loader.events();
        let at = |event: String| events.iter().position(|e| *e == event).unwrap();
        for (dependent, dependency) in &dependencies {
            let end_event = format!("end {dependency}");
            let start_event = format!("start {dependent}");
            prop_assert!(at(end_event) < at(start_event));
        }
        for call in loader.calls_for(DEPLOY_OPERATION) {
            if let Value::Object(inputs) = &call.inputs {
                for (key, value) in inputs {
                    prop_assert_eq!(key.trim_start_matches("from_"), value.as_str().unwrap());
                }
            }
        }
    }

    /// PROPERTY: the plan places every dependency in an earlier round, and every
    /// component in exactly one round.
    #[test]
    fn property_plan_rounds_respect_dependencies(
        (size, edges) in (1usize..10).prop_flat_map(|n| (Just(n), proptest::collection::vec(any::<bool>(), n * n)))
    ) {
        let (value, dependencies) = dag_template(size, &edges);
        let deployer = Deployer::new(
            Arc::new(MockLocator::new()),
            Arc::new(MockLoader::new()),
            Arc::new(MemoryStateStore::new()),
        );

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let rounds = runtime.block_on(deployer.plan(&template(value))).unwrap();

        let round_of = |alias: &str| rounds.iter().position(|round| round.iter().any(|a| a == alias)).unwrap();
        prop_assert_eq!(rounds.iter().map(Vec::len).sum::<usize>(), size);
        for (dependent, dependency) in &dependencies {
            prop_assert!(round_of(dependency) < round_of(dependent));
        }
    }
}
