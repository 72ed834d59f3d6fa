//! Graph-wide validation and build ordering.
//!
//! Order is computed with Kahn's algorithm over a min-heap keyed by
//! `(phase, declaration index)`, so among the nodes whose dependencies are
//! all built, earlier phases go first and ties keep declaration order. The
//! result is stable: the same node list always yields the same order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use tg_core::{BuildPhase, ResourceNode, TopologyError, TopologyResult};

fn is_valid_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Check names, uniqueness, references and phase monotonicity.
///
/// Cycles are reported by [`build_order`].
pub fn validate(nodes: &[ResourceNode], project: &str) -> TopologyResult<()> {
    let mut index: HashMap<&str, &ResourceNode> = HashMap::with_capacity(nodes.len());

    for node in nodes {
        let name = node.id.as_str();
        if !is_valid_name(name) {
            return Err(TopologyError::InvalidName {
                name: name.to_string(),
                reason: "must be lowercase alphanumerics and hyphens".to_string(),
            });
        }
        if !name.starts_with(project) {
            return Err(TopologyError::InvalidName {
                name: name.to_string(),
                reason: format!("must start with {}", project),
            });
        }
        if name.len() > node.kind.max_name_len() {
            return Err(TopologyError::InvalidName {
                name: name.to_string(),
                reason: format!("longer than {} characters", node.kind.max_name_len()),
            });
        }
        if index.insert(name, node).is_some() {
            return Err(TopologyError::DuplicateName(node.id.clone()));
        }
    }

    for node in nodes {
        for dependency in &node.depends_on {
            let target = index
                .get(dependency.as_str())
                .ok_or_else(|| TopologyError::DanglingReference {
                    from: node.id.to_string(),
                    to: dependency.clone(),
                })?;
            if target.phase > node.phase {
                return Err(TopologyError::PhaseInversion {
                    node: node.id.clone(),
                    node_phase: node.phase,
                    dependency: dependency.clone(),
                    dependency_phase: target.phase,
                });
            }
        }
    }

    Ok(())
}

/// Topological build order as indices into `nodes`.
///
/// Expects [`validate`] to have passed; unknown dependencies are ignored.
pub fn build_order(nodes: &[ResourceNode]) -> TopologyResult<Vec<usize>> {
    let n = nodes.len();
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, node) in nodes.iter().enumerate() {
        for dependency in &node.depends_on {
            if let Some(&d) = position.get(dependency.as_str()) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut heap: BinaryHeap<Reverse<(BuildPhase, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse((nodes[i].phase, i)))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((_, current))) = heap.pop() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                heap.push(Reverse((nodes[next].phase, next)));
            }
        }
    }

    if order.len() < n {
        let cycle = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(i, _)| nodes[i].id.clone())
            .collect();
        return Err(TopologyError::DependencyCycle(cycle));
    }

    debug!("Computed build order over {} nodes", n);
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_core::{
        ContextResolver, NamingStrategy, ProjectContext, ResourceId, ResourceKind, SynthConfig,
    };

    fn ctx() -> ProjectContext {
        ContextResolver::resolve(Some("dev"), &SynthConfig::default()).unwrap()
    }

    fn id(ctx: &ProjectContext, q: &str) -> ResourceId {
        NamingStrategy::new(ctx).qualified(ResourceKind::Subnet, q)
    }

    fn node(id: ResourceId, phase: BuildPhase, deps: &[&ResourceId]) -> ResourceNode {
        ResourceNode::new(id, ResourceKind::Subnet, phase, &serde_json::json!({}))
            .unwrap()
            .depends_on(deps.iter().copied())
    }

    #[test]
    fn test_order_respects_dependencies_and_phase() {
        let ctx = ctx();
        let (a, b, c) = (id(&ctx, "a"), id(&ctx, "b"), id(&ctx, "c"));
        // Declared out of order on purpose.
        let nodes = vec![
            node(c.clone(), BuildPhase::Compute, &[&b]),
            node(b.clone(), BuildPhase::Security, &[&a]),
            node(a.clone(), BuildPhase::Network, &[]),
        ];
        validate(&nodes, ctx.project_name()).unwrap();
        assert_eq!(build_order(&nodes).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let ctx = ctx();
        let nodes = vec![
            node(id(&ctx, "x"), BuildPhase::Data, &[]),
            node(id(&ctx, "y"), BuildPhase::Network, &[]),
            node(id(&ctx, "z"), BuildPhase::Data, &[]),
        ];
        assert_eq!(build_order(&nodes).unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn test_cycle_detected() {
        let ctx = ctx();
        let (a, b, c) = (id(&ctx, "a"), id(&ctx, "b"), id(&ctx, "c"));
        let nodes = vec![
            node(a.clone(), BuildPhase::Network, &[&b]),
            node(b.clone(), BuildPhase::Network, &[&a]),
            node(c.clone(), BuildPhase::Network, &[]),
        ];
        assert_eq!(
            build_order(&nodes),
            Err(TopologyError::DependencyCycle(vec![a, b]))
        );
    }

    #[test]
    fn test_dangling_reference() {
        let ctx = ctx();
        let missing = id(&ctx, "missing");
        let nodes = vec![node(id(&ctx, "a"), BuildPhase::Network, &[&missing])];
        assert!(matches!(
            validate(&nodes, ctx.project_name()),
            Err(TopologyError::DanglingReference { to, .. }) if to == missing
        ));
    }

    #[test]
    fn test_duplicate_name() {
        let ctx = ctx();
        let a = id(&ctx, "a");
        let nodes = vec![
            node(a.clone(), BuildPhase::Network, &[]),
            node(a.clone(), BuildPhase::Data, &[]),
        ];
        assert_eq!(
            validate(&nodes, ctx.project_name()),
            Err(TopologyError::DuplicateName(a))
        );
    }

    #[test]
    fn test_phase_inversion() {
        let ctx = ctx();
        let (a, b) = (id(&ctx, "a"), id(&ctx, "b"));
        let nodes = vec![
            node(a.clone(), BuildPhase::Network, &[&b]),
            node(b.clone(), BuildPhase::Edge, &[]),
        ];
        assert!(matches!(
            validate(&nodes, ctx.project_name()),
            Err(TopologyError::PhaseInversion { .. })
        ));
    }

    #[test]
    fn test_foreign_prefix_rejected() {
        let ctx = ctx();
        let nodes = vec![node(id(&ctx, "a"), BuildPhase::Network, &[])];
        assert!(matches!(
            validate(&nodes, "other-dev"),
            Err(TopologyError::InvalidName { .. })
        ));
    }
}
