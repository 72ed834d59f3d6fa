//! Integration tests for the resource specification builders.

use tg_core::{ContextResolver, Environment, ProjectContext, SubGraph, SynthConfig};
use tg_network::NetworkTopologyBuilder;
use tg_policy::{RuleSet, SecurityPolicyGraph};
use tg_specs::{ComplianceSpec, ComputeFleet, DatabaseSpec, EdgeSpec, StorageSpec};

struct Specs {
    ctx: ProjectContext,
    storage: StorageSpec,
    database: DatabaseSpec,
    compute: ComputeFleet,
    monitoring: ComplianceSpec,
    edge: EdgeSpec,
}

fn build(env: Environment, config: &SynthConfig) -> Specs {
    let ctx = ContextResolver::resolve(Some(env.as_str()), config).unwrap();
    let network = NetworkTopologyBuilder::new(config.network.cidr.clone(), config.network.az_count)
        .build(&ctx)
        .unwrap();
    let security = SecurityPolicyGraph::build(&ctx, &network).unwrap();
    let storage = StorageSpec::build(&ctx, config).unwrap();
    let database = DatabaseSpec::build(&ctx, config, &network, &security, &storage).unwrap();
    let compute = ComputeFleet::build(&ctx, config, &network, &security, &storage).unwrap();
    let monitoring = ComplianceSpec::build(&ctx, config).unwrap();
    let edge = EdgeSpec::build(&ctx, &compute).unwrap();
    Specs {
        ctx,
        storage,
        database,
        compute,
        monitoring,
        edge,
    }
}

#[test]
fn test_every_environment_builds() {
    for env in Environment::all() {
        let specs = build(env, &SynthConfig::default());
        assert_eq!(specs.ctx.environment(), env);
    }
}

#[test]
fn test_all_nodes_prefixed_with_project() {
    let specs = build(Environment::Staging, &SynthConfig::default());
    let graphs: [&dyn SubGraph; 5] = [
        &specs.storage,
        &specs.database,
        &specs.compute,
        &specs.monitoring,
        &specs.edge,
    ];
    for graph in graphs {
        for node in graph.nodes().unwrap() {
            assert!(
                node.id.as_str().starts_with(specs.ctx.project_name()),
                "{} in {}",
                node.id,
                graph.name()
            );
        }
    }
}

#[test]
fn test_no_policy_statement_is_fully_unscoped() {
    let specs = build(Environment::Prod, &SynthConfig::default());
    let rules = RuleSet::least_privilege();
    let role = &specs.monitoring.role;
    let policy = &specs.monitoring.bucket_policy;

    assert!(rules
        .evaluate(specs.ctx.project_name(), &role.id, &role.statements)
        .is_empty());
    assert!(rules
        .evaluate(specs.ctx.project_name(), &policy.id, &policy.statements)
        .is_empty());
}

#[test]
fn test_three_zones_spread_the_fleet() {
    let config = SynthConfig::default().with_az_count(3);
    let specs = build(Environment::Prod, &config);
    assert_eq!(specs.compute.scaling.subnets.len(), 3);
    assert_eq!(specs.compute.load_balancer.subnets.len(), 3);
}

#[test]
fn test_rebuild_is_identical() {
    let first = build(Environment::Dev, &SynthConfig::default());
    let second = build(Environment::Dev, &SynthConfig::default());
    assert_eq!(first.database, second.database);
    assert_eq!(first.compute, second.compute);
    assert_eq!(first.edge.nodes().unwrap(), second.edge.nodes().unwrap());
}
