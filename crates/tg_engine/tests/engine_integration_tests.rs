//! Integration tests for the local provisioning engine.

use tempfile::TempDir;

use tg_core::SynthConfig;
use tg_engine::{EngineError, LocalEngine, ProvisioningEngine, ResourceAction};
use tg_synth::{Manifest, OutputBinding, TopologyOrchestrator, DISTRIBUTION_DOMAIN};

fn manifest(config: SynthConfig, env: &str) -> Manifest {
    TopologyOrchestrator::new(config)
        .synthesize(Some(env))
        .unwrap()
        .manifest
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("engine.json");
    let manifest = manifest(SynthConfig::default(), "dev");

    let first = LocalEngine::open(&path).await.unwrap();
    let created = first.materialize(&manifest).await.unwrap();
    assert!(path.exists());

    let second = LocalEngine::open(&path).await.unwrap();
    let report = second.materialize(&manifest).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(
        report.output(DISTRIBUTION_DOMAIN),
        created.output(DISTRIBUTION_DOMAIN)
    );
}

#[tokio::test]
async fn test_destroy_empties_state_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    let manifest = manifest(SynthConfig::default(), "staging");

    let engine = LocalEngine::open(&path).await.unwrap();
    engine.materialize(&manifest).await.unwrap();
    let report = engine.teardown(&manifest).await.unwrap();
    assert_eq!(report.deleted().count(), manifest.nodes.len());

    let reopened = LocalEngine::open(&path).await.unwrap();
    assert!(reopened.state().stacks.is_empty());
}

#[tokio::test]
async fn test_corrupt_state_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = LocalEngine::open(&path).await.err().unwrap();
    assert!(matches!(err, EngineError::State { .. }));
}

#[tokio::test]
async fn test_shrinking_zones_prunes_subnets() {
    let engine = LocalEngine::in_memory();
    let wide = manifest(SynthConfig::default().with_az_count(3), "dev");
    let narrow = manifest(SynthConfig::default().with_az_count(2), "dev");

    engine.materialize(&wide).await.unwrap();
    let report = engine.materialize(&narrow).await.unwrap();

    assert_eq!(report.count(ResourceAction::Deleted), 3);
    assert!(report.count(ResourceAction::Updated) >= 1);
    assert_eq!(
        engine.state().resources(&narrow.project).len(),
        narrow.nodes.len()
    );
}

#[tokio::test]
async fn test_projects_are_isolated() {
    let engine = LocalEngine::in_memory();
    let dev = manifest(SynthConfig::default(), "dev");
    let prod = manifest(SynthConfig::default(), "prod");

    engine.materialize(&dev).await.unwrap();
    engine.materialize(&prod).await.unwrap();
    engine.teardown(&dev).await.unwrap();

    assert!(engine.state().resources(&dev.project).is_empty());
    assert_eq!(engine.state().resources(&prod.project).len(), prod.nodes.len());
}

#[tokio::test]
async fn test_missing_output_attribute_is_engine_error() {
    let mut manifest = manifest(SynthConfig::default(), "dev");
    let vpc = manifest.nodes[0].id.clone();
    manifest.outputs.push(OutputBinding::new("VpcDns", &vpc, "dns_name", "none"));

    let err = LocalEngine::in_memory()
        .materialize(&manifest)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Output(_)));
}

#[tokio::test]
async fn test_retained_resources_survive_reopen_and_redeploy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    let manifest = manifest(SynthConfig::default(), "prod");

    let engine = LocalEngine::open(&path).await.unwrap();
    engine.materialize(&manifest).await.unwrap();
    let teardown = engine.teardown(&manifest).await.unwrap();
    let retained = teardown.retained().count();
    assert!(retained > 0);

    let reopened = LocalEngine::open(&path).await.unwrap();
    assert_eq!(reopened.state().retained(&manifest.project).len(), retained);
    assert!(reopened.state().resources(&manifest.project).is_empty());

    let report = reopened.materialize(&manifest).await.unwrap();
    assert_eq!(report.count(ResourceAction::Updated), retained);
    assert_eq!(
        reopened.state().resources(&manifest.project).len(),
        manifest.nodes.len()
    );
}
