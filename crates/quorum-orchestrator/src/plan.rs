use quorum_core::{Provider, QuorumError, QuorumResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A set of mutually independent providers executed concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Providers with no unresolved dependencies on each other.
    pub providers: Vec<Provider>,
}

/// An ordered sequence of stages forming a topological layering of the
/// selected providers' dependency graph.
///
/// A provider only ever appears in a later stage than every selected
/// provider it depends on; dependencies outside the selected set are
/// treated as already satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Stages in execution order.
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    /// An empty plan (no candidates found; not an error).
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    /// Layer the given providers topologically by their dependencies.
    ///
    /// Dependencies on ids outside `providers` are treated as satisfied.
    /// Returns `DependencyCycle` if the restricted graph cannot be layered.
    pub fn layered(providers: Vec<Provider>) -> QuorumResult<Self> {
        let selected_ids: HashSet<String> = providers.iter().map(|p| p.id.clone()).collect();
        let mut remaining = providers;
        let mut placed: HashSet<String> = HashSet::new();
        let mut stages = Vec::new();

        while !remaining.is_empty() {
            let (mut ready, rest): (Vec<Provider>, Vec<Provider>) =
                remaining.into_iter().partition(|provider| {
                    provider
                        .dependencies
                        .iter()
                        .filter(|dep| selected_ids.contains(*dep))
                        .all(|dep| placed.contains(dep))
                });

            if ready.is_empty() {
                let stuck: Vec<String> = rest.iter().map(|p| p.id.clone()).collect();
                return Err(QuorumError::DependencyCycle(format!(
                    "cannot layer providers: {}",
                    stuck.join(", ")
                )));
            }

            // Deterministic in-stage order regardless of input order.
            ready.sort_by(|a, b| a.id.cmp(&b.id));
            for provider in &ready {
                placed.insert(provider.id.clone());
            }
            stages.push(Stage { providers: ready });
            remaining = rest;
        }

        Ok(Self { stages })
    }

    /// Number of stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total providers across all stages.
    pub fn provider_count(&self) -> usize {
        self.stages.iter().map(|s| s.providers.len()).sum()
    }

    /// Whether the plan has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// All provider ids in plan order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|s| s.providers.iter().map(|p| p.id.clone()))
            .collect()
    }

    /// Whether no two providers in the same stage have a dependency edge
    /// between them and every in-plan dependency sits in an earlier stage.
    pub fn is_valid_layering(&self) -> bool {
        let all_ids: HashSet<&str> = self
            .stages
            .iter()
            .flat_map(|s| s.providers.iter().map(|p| p.id.as_str()))
            .collect();
        let mut earlier: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            let stage_ids: HashSet<&str> =
                stage.providers.iter().map(|p| p.id.as_str()).collect();
            for provider in &stage.providers {
                for dep in &provider.dependencies {
                    if stage_ids.contains(dep.as_str()) {
                        return false;
                    }
                    if all_ids.contains(dep.as_str()) && !earlier.contains(dep.as_str()) {
                        return false;
                    }
                }
            }
            earlier.extend(stage_ids);
        }
        true
    }
}
