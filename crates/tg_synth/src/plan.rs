//! Human-readable build plan.

use std::fmt;

use serde::Serialize;

use tg_core::{BuildPhase, ResourceId, ResourceKind};

use crate::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub depends_on: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStep {
    pub phase: BuildPhase,
    pub resources: Vec<PlannedResource>,
}

/// The manifest's build order grouped by phase. Empty phases are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub project: String,
    pub steps: Vec<PhaseStep>,
}

impl BuildPlan {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let steps = BuildPhase::all()
            .into_iter()
            .map(|phase| PhaseStep {
                phase,
                resources: manifest
                    .phase(phase)
                    .map(|node| PlannedResource {
                        id: node.id.clone(),
                        kind: node.kind,
                        depends_on: node.depends_on.len(),
                    })
                    .collect(),
            })
            .filter(|step| !step.resources.is_empty())
            .collect();

        Self {
            project: manifest.project.clone(),
            steps,
        }
    }

    pub fn resource_count(&self) -> usize {
        self.steps.iter().map(|s| s.resources.len()).sum()
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build plan for {} ({} resources)", self.project, self.resource_count())?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "{}. {} ({})", i + 1, step.phase, step.resources.len())?;
            for resource in &step.resources {
                writeln!(f, "   {:<22} {}", resource.kind.to_string(), resource.id)?;
            }
        }
        Ok(())
    }
}
