//! End-to-end tests of the `stackweave` binary with shell-script components.
#![cfg(unix)]

use crate::common::TestProject;
use assert_cmd::Command;
use predicates::prelude::*;

const CHAIN_TEMPLATE: &str = r#"
region: eu-west-1
bucket:
  component: ./components/echo
  inputs:
    region: "${region}"
site:
  component: ./components/echo
  inputs:
    bucket_region: "${bucket.region}"
    label: "site in ${bucket.region}"
"#;

fn chain_project() -> TestProject {
    let project = TestProject::new().unwrap();
    project.add_echo_component("echo").unwrap();
    project.write_template(CHAIN_TEMPLATE).unwrap();
    project
}

#[test]
fn test_deploy_prints_outputs_and_writes_state() {
    let project = chain_project();

    let output = project.run_stackweave(&["deploy"]).unwrap();

    output
        .assert_success()
        .assert_stdout_contains("Deployed 2 component(s) to 'default' in 2 round(s)")
        .assert_stdout_contains("\"bucket_region\": \"eu-west-1\"")
        .assert_stdout_contains("\"label\": \"site in eu-west-1\"");

    let state = project.read_state("default").expect("state file written");
    assert!(state.starts_with("# Auto-generated deployment state - DO NOT EDIT"));
    assert!(state.contains("bucket = \"./components/echo\""));
    assert!(state.contains("site = \"./components/echo\""));
}

#[test]
fn test_deploy_json_format() {
    let project = chain_project();

    let output = project.run_stackweave(&["deploy", "--format", "json"]).unwrap();
    output.assert_success();

    let outputs: serde_json::Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(outputs["bucket"]["region"], "eu-west-1");
    assert_eq!(outputs["site"]["bucket_region"], "eu-west-1");
}

#[test]
fn test_redeploy_removes_dropped_component() {
    let project = chain_project();
    project.run_stackweave(&["deploy", "--instance", "prod"]).unwrap().assert_success();

    project
        .write_template("bucket:\n  component: ./components/echo\n  inputs:\n    region: us-east-1\n")
        .unwrap();
    let output = project.run_stackweave(&["deploy", "--instance", "prod"]).unwrap();

    output.assert_success().assert_stdout_contains("removed site");
    assert_eq!(project.removed_log(), vec!["site"]);
    let state = project.read_state("prod").unwrap();
    assert!(!state.contains("site"));
}

#[test]
fn test_remove_tears_down_instance() {
    let project = chain_project();
    project.run_stackweave(&["deploy"]).unwrap().assert_success();

    let output = project.run_stackweave(&["remove"]).unwrap();

    output.assert_success().assert_stdout_contains("Removed 2 component(s) from 'default'");
    let mut removed = project.removed_log();
    removed.sort();
    assert_eq!(removed, vec!["bucket", "site"]);

    let again = project.run_stackweave(&["remove"]).unwrap();
    again.assert_success().assert_stdout_contains("Nothing to remove for 'default'");
}

#[test]
fn test_plan_lists_rounds() {
    let project = chain_project();

    let output = project.run_stackweave(&["plan"]).unwrap();

    output
        .assert_success()
        .assert_stdout_contains("Round 1: bucket")
        .assert_stdout_contains("Round 2: site");
    assert!(project.read_state("default").is_none());
}

#[test]
fn test_invoke_custom_operation() {
    let project = chain_project();

    let output =
        project.run_stackweave(&["invoke", "ping", "--alias", "site"]).unwrap();

    output.assert_success().assert_stdout_contains("\"pong\": \"site\"");
    assert!(!output.stdout.contains("bucket"));
}

#[test]
fn test_invoke_unsupported_operation_fails() {
    let project = chain_project();

    let output = project.run_stackweave(&["invoke", "explode"]).unwrap();

    output
        .assert_failure()
        .assert_stderr_contains("Operation 'explode' is not implemented by: bucket, site");
}

#[test]
fn test_circular_dependency_reported() {
    let project = TestProject::new().unwrap();
    project.add_echo_component("echo").unwrap();
    project
        .write_template(
            r#"
a:
  component: ./components/echo
  inputs:
    v: "${b.v}"
b:
  component: ./components/echo
  inputs:
    v: "${a.v}"
"#,
        )
        .unwrap();

    let output = project.run_stackweave(&["deploy"]).unwrap();

    output
        .assert_failure()
        .assert_stderr_contains("Your template has circular dependencies:")
        .assert_stderr_contains("a → b → a");
    assert!(project.read_state("default").is_none());
}

#[test]
fn test_failing_component_reports_stderr() {
    let project = TestProject::new().unwrap();
    project.add_component("broken", &[("deploy", "echo 'quota exceeded' >&2; exit 3")]).unwrap();
    project.write_template("db:\n  component: ./components/broken\n").unwrap();

    let output = project.run_stackweave(&["deploy"]).unwrap();

    output.assert_failure().assert_stderr_contains("quota exceeded");
}

#[test]
fn test_missing_template_suggests_fix() {
    let project = TestProject::new().unwrap();

    let output = project.run_stackweave(&["deploy"]).unwrap();

    output
        .assert_failure()
        .assert_stderr_contains("Template file not found")
        .assert_stderr_contains("Pass --template");
}

#[test]
fn test_missing_component_reported() {
    let project = TestProject::new().unwrap();
    project.write_template("db:\n  component: ./components/nowhere\n").unwrap();

    let output = project.run_stackweave(&["deploy"]).unwrap();

    output.assert_failure().assert_stderr_contains("nowhere");
}

#[test]
fn test_state_dir_flag_overrides_config() {
    let project = chain_project();
    let custom = project.project_path().join("custom-state");

    project
        .run_stackweave(&["deploy", "--state-dir", custom.to_str().unwrap()])
        .unwrap()
        .assert_success();

    assert!(custom.join("default.toml").is_file());
    assert!(project.read_state("default").is_none());
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("stackweave")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("remove"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("invoke"));
}

#[test]
fn test_verbose_conflicts_with_quiet() {
    Command::cargo_bin("stackweave")
        .unwrap()
        .args(["--verbose", "--quiet", "plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
