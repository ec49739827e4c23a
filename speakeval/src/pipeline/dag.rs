//! Validated stage DAG.
//!
//! A [`StageGraph`] is produced only by [`GraphBuilder::build`](super::GraphBuilder::build)
//! and is immutable afterwards. It can be shared across any number of runs.

use super::StageSpec;
use crate::core::{StageRole, StageRunRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A directed acyclic graph of stages with one entry, N fan-out stages and
/// one aggregation stage.
#[derive(Debug)]
pub struct StageGraph {
    /// The graph name.
    name: String,
    /// Stage specifications.
    stages: HashMap<String, StageSpec>,
    /// Execution order (topologically sorted).
    execution_order: Vec<String>,
    entry: String,
    aggregation: String,
}

impl StageGraph {
    pub(crate) fn new(
        name: String,
        stages: HashMap<String, StageSpec>,
        stage_order: Vec<String>,
    ) -> Self {
        let execution_order = topological_sort(&stages, &stage_order);
        let find_role = |role: StageRole| {
            stage_order
                .iter()
                .find(|n| stages.get(*n).is_some_and(|s| s.role == role))
                .cloned()
                .unwrap_or_default()
        };
        let entry = find_role(StageRole::Entry);
        let aggregation = find_role(StageRole::Aggregation);

        Self {
            name,
            stages,
            execution_order,
            entry,
            aggregation,
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the execution order.
    ///
    /// Dependencies come first; ties are broken by insertion order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Gets a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// Iterates over stages in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &StageSpec> {
        self.execution_order
            .iter()
            .filter_map(|name| self.stages.get(name))
    }

    /// Returns the entry stage.
    #[must_use]
    pub fn entry(&self) -> &StageSpec {
        &self.stages[&self.entry]
    }

    /// Returns the aggregation stage.
    #[must_use]
    pub fn aggregation(&self) -> &StageSpec {
        &self.stages[&self.aggregation]
    }

    /// Returns the fan-out stages in execution order.
    #[must_use]
    pub fn fan_out(&self) -> Vec<&StageSpec> {
        self.stages()
            .filter(|s| s.role == StageRole::FanOut)
            .collect()
    }

    /// Returns the direct dependencies of a stage.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.stages.get(name).map(|s| &s.dependencies)
    }

    /// Returns the stages that depend directly on `name`, in execution order.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.stages()
            .filter(|s| s.dependencies.contains(name))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Returns the pending stages whose dependencies are all terminal, in
    /// execution order.
    #[must_use]
    pub fn ready_stages(&self, records: &BTreeMap<String, StageRunRecord>) -> Vec<&StageSpec> {
        let is_terminal = |name: &String| records.get(name).is_some_and(StageRunRecord::is_terminal);
        let is_pending = |name: &String| {
            records
                .get(name)
                .map_or(true, |r| r.status == crate::core::StageStatus::Pending)
        };

        self.stages()
            .filter(|s| is_pending(&s.name) && s.dependencies.iter().all(is_terminal))
            .collect()
    }
}

/// Performs topological sort on the stage graph.
fn topological_sort(stages: &HashMap<String, StageSpec>, stage_order: &[String]) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    fn visit(
        node: &str,
        stages: &HashMap<String, StageSpec>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(node) || temp_visited.contains(node) {
            return;
        }

        temp_visited.insert(node.to_string());

        if let Some(spec) = stages.get(node) {
            for dep in &spec.dependencies {
                visit(dep, stages, visited, temp_visited, result);
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());
    }

    // Visit in insertion order for determinism
    for name in stage_order {
        visit(name, stages, &mut visited, &mut temp_visited, &mut result);
    }

    result
}
