//! Topology orchestrator.
//!
//! Resolves the project context once, runs every builder in dependency
//! order, composes their sub-graphs into one manifest and validates the
//! graph as a whole. It is the only place where one builder's output is
//! handed to another.

use tracing::{debug, info};

use tg_core::{
    common_tags, ContextResolver, ProjectContext, ResourceNode, SubGraph, SynthConfig,
    SynthResult, TopologyError,
};
use tg_network::{NetworkTopology, NetworkTopologyBuilder};
use tg_policy::SecurityPolicyGraph;
use tg_specs::{ComplianceSpec, ComputeFleet, DatabaseSpec, EdgeSpec, StorageSpec};

use crate::dag;
use crate::manifest::Manifest;
use crate::outputs::{OutputBinder, OutputBinding};

/// Every sub-graph of one synthesis run.
#[derive(Debug, Clone)]
pub struct Topology {
    pub network: NetworkTopology,
    pub security: SecurityPolicyGraph,
    pub storage: StorageSpec,
    pub database: DatabaseSpec,
    pub compute: ComputeFleet,
    pub monitoring: ComplianceSpec,
    pub edge: EdgeSpec,
}

impl Topology {
    /// Run the builders in dependency order.
    pub fn build(ctx: &ProjectContext, config: &SynthConfig) -> SynthResult<Self> {
        let network =
            NetworkTopologyBuilder::new(config.network.cidr.clone(), config.network.az_count).build(ctx)?;
        let security = SecurityPolicyGraph::build(ctx, &network)?;
        let storage = StorageSpec::build(ctx, config)?;
        let database = DatabaseSpec::build(ctx, config, &network, &security, &storage)?;
        let compute = ComputeFleet::build(ctx, config, &network, &security, &storage)?;
        let monitoring = ComplianceSpec::build(ctx, config)?;
        let edge = EdgeSpec::build(ctx, &compute)?;

        Ok(Self {
            network,
            security,
            storage,
            database,
            compute,
            monitoring,
            edge,
        })
    }

    /// Sub-graphs in declaration order.
    pub fn sub_graphs(&self) -> [&dyn SubGraph; 7] {
        [
            &self.network,
            &self.security,
            &self.storage,
            &self.database,
            &self.compute,
            &self.monitoring,
            &self.edge,
        ]
    }

    pub fn outputs(&self) -> Vec<OutputBinding> {
        OutputBinder::declare(&self.compute, &self.edge, &self.database)
    }
}

/// Result of a synthesis run.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub context: ProjectContext,
    pub topology: Topology,
    pub manifest: Manifest,
}

pub struct TopologyOrchestrator {
    config: SynthConfig,
}

impl TopologyOrchestrator {
    pub fn new(config: SynthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Resolve the context from `suffix` and synthesize the manifest.
    pub fn synthesize(&self, suffix: Option<&str>) -> SynthResult<Synthesis> {
        let context = ContextResolver::resolve(suffix, &self.config)?;
        info!("Synthesizing topology for {}", context.project_name());

        let topology = Topology::build(&context, &self.config)?;
        let manifest = compose(&context, &topology.sub_graphs(), topology.outputs())?;

        info!(
            "Synthesized {} resources and {} outputs for {}",
            manifest.nodes.len(),
            manifest.outputs.len(),
            context.project_name()
        );
        Ok(Synthesis {
            context,
            topology,
            manifest,
        })
    }
}

/// Compose sub-graphs into a validated manifest with nodes in build order.
pub fn compose(
    ctx: &ProjectContext,
    graphs: &[&dyn SubGraph],
    outputs: Vec<OutputBinding>,
) -> SynthResult<Manifest> {
    let tags = common_tags(ctx);
    let mut nodes: Vec<ResourceNode> = Vec::new();
    for graph in graphs {
        let graph_nodes = graph.nodes()?;
        debug!("Sub-graph {} contributed {} nodes", graph.name(), graph_nodes.len());
        nodes.extend(graph_nodes.into_iter().map(|node| node.with_tags(&tags)));
    }

    dag::validate(&nodes, ctx.project_name())?;
    let order = dag::build_order(&nodes)?;
    OutputBinder::validate(&outputs, &nodes)?;

    let mut slots: Vec<Option<ResourceNode>> = nodes.into_iter().map(Some).collect();
    let ordered = order
        .into_iter()
        .map(|i| slots[i].take())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| TopologyError::DependencyCycle(Vec::new()))?;

    Ok(Manifest {
        project: ctx.project_name().to_string(),
        environment: ctx.environment(),
        account: ctx.account().to_string(),
        region: ctx.region().to_string(),
        nodes: ordered,
        outputs,
    })
}
