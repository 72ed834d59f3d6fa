//! End-to-end tests for the tiergraph binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn tiergraph(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tiergraph"))
        .current_dir(dir)
        .env_remove("TIERGRAPH_ENV")
        .env_remove("TIERGRAPH_ACCOUNT")
        .env_remove("TIERGRAPH_REGION")
        .env("RUST_LOG", "error")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_synth_writes_manifest() {
    let dir = TempDir::new().unwrap();
    let output = tiergraph(dir.path(), &["synth", "--env", "staging", "--out", "manifest.yaml"]);
    assert!(output.status.success());

    let content = std::fs::read_to_string(dir.path().join("manifest.yaml")).unwrap();
    assert!(content.contains("project: product-staging"));
}

#[test]
fn test_synth_to_stdout_is_stable() {
    let dir = TempDir::new().unwrap();
    let first = tiergraph(dir.path(), &["synth"]);
    let second = tiergraph(dir.path(), &["synth"]);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    assert!(String::from_utf8_lossy(&first.stdout).contains("\"project\": \"product-dev\""));
}

#[test]
fn test_unknown_environment_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let output = tiergraph(dir.path(), &["plan", "--env", "qa"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("dev, staging, prod"));
}

#[test]
fn test_environment_variable_selects_environment() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_tiergraph"))
        .current_dir(dir.path())
        .env("TIERGRAPH_ENV", "prod")
        .env("RUST_LOG", "error")
        .arg("plan")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Build plan for product-prod"));
}

#[test]
fn test_bad_address_space_exits_with_three() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tiergraph.yaml"), "network:\n  cidr: 10.0.0.0/23\n").unwrap();
    let output = tiergraph(dir.path(), &["synth", "--config", "tiergraph.yaml"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_deploy_then_destroy() {
    let dir = TempDir::new().unwrap();

    let deployed = tiergraph(dir.path(), &["deploy", "--env", "prod", "--state", "state.json"]);
    assert!(deployed.status.success());
    let stdout = String::from_utf8_lossy(&deployed.stdout);
    assert!(stdout.contains("LoadBalancerDns"));
    assert!(dir.path().join("state.json").exists());

    let again = tiergraph(dir.path(), &["deploy", "--env", "prod", "--state", "state.json"]);
    assert!(String::from_utf8_lossy(&again.stdout).contains("product-prod is up to date"));

    let destroyed = tiergraph(dir.path(), &["destroy", "--env", "prod", "--state", "state.json"]);
    assert!(destroyed.status.success());
    assert!(String::from_utf8_lossy(&destroyed.stdout).contains("retained"));
}
