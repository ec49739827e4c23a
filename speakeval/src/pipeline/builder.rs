//! Graph builder with validation.

use super::{StageGraph, StageSpec};
use crate::core::StageRole;
use crate::errors::{codes, ContractErrorInfo, CycleDetectedError, GraphValidationError};
use crate::stages::Stage;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated stage graphs.
///
/// Dependencies are resolved in [`build`](Self::build), so stages may be
/// added in any order.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    /// The graph name.
    name: String,
    /// The stage specifications.
    stages: HashMap<String, StageSpec>,
    /// Insertion order for stages.
    stage_order: Vec<String>,
}

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: HashMap::new(),
            stage_order: Vec::new(),
        }
    }

    /// Adds a stage with explicit role and dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage itself is invalid or its name is taken.
    pub fn stage(
        mut self,
        runner: Arc<dyn Stage>,
        role: StageRole,
        dependencies: &[&str],
    ) -> Result<Self, GraphValidationError> {
        let spec = StageSpec::new(runner, role).with_dependencies(dependencies.iter().copied());
        self.add_stage_spec(spec)?;
        Ok(self)
    }

    /// Adds the entry stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn entry(self, runner: Arc<dyn Stage>) -> Result<Self, GraphValidationError> {
        self.stage(runner, StageRole::Entry, &[])
    }

    /// Adds a fan-out stage depending on the entry stage added so far.
    ///
    /// # Errors
    ///
    /// Returns an error if no entry stage has been added yet, the stage is
    /// invalid, or its name is taken.
    pub fn fan_out(self, runner: Arc<dyn Stage>) -> Result<Self, GraphValidationError> {
        let entry = self.names_with_role(StageRole::Entry);
        let Some(entry) = entry.first().cloned() else {
            return Err(GraphValidationError::new(format!(
                "Fan-out stage '{}' added before an entry stage",
                runner.name()
            ))
            .with_error_info(
                ContractErrorInfo::new(codes::TOPOLOGY, "No entry stage to depend on")
                    .with_fix_hint("Call `entry` before adding fan-out stages."),
            ));
        };
        self.stage(runner, StageRole::FanOut, &[entry.as_str()])
    }

    /// Adds the aggregation stage depending on every fan-out stage added so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn aggregate(self, runner: Arc<dyn Stage>) -> Result<Self, GraphValidationError> {
        let fan_out = self.names_with_role(StageRole::FanOut);
        let deps: Vec<&str> = fan_out.iter().map(String::as_str).collect();
        self.stage(runner, StageRole::Aggregation, &deps)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is invalid or a stage with the same name exists.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), GraphValidationError> {
        spec.validate()?;

        if self.stages.contains_key(&spec.name) {
            return Err(GraphValidationError::new(format!(
                "Stage '{}' is defined more than once",
                spec.name
            ))
            .with_stages(vec![spec.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    codes::DUPLICATE,
                    format!("Duplicate stage name '{}'", spec.name),
                )
                .with_fix_hint("Give every stage a unique name."),
            ));
        }

        self.stage_order.push(spec.name.clone());
        self.stages.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found: empty graph, unknown
    /// dependency, cycle, output collision, wrong topology, or an
    /// aggregation input nobody produces.
    pub fn build(self) -> Result<StageGraph, GraphValidationError> {
        if self.stages.is_empty() {
            return Err(GraphValidationError::new("Graph has no stages").with_error_info(
                ContractErrorInfo::new(codes::EMPTY, "Cannot build an empty graph")
                    .with_fix_hint("Add an entry, fan-out and aggregation stage before building."),
            ));
        }

        self.check_dependencies()?;
        self.detect_cycles()?;
        self.check_output_collisions()?;
        self.check_topology()?;
        self.check_coverage()?;

        Ok(StageGraph::new(self.name, self.stages, self.stage_order))
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

    fn names_with_role(&self, role: StageRole) -> Vec<String> {
        self.stage_order
            .iter()
            .filter(|name| self.stages.get(*name).is_some_and(|s| s.role == role))
            .cloned()
            .collect()
    }

    fn check_dependencies(&self) -> Result<(), GraphValidationError> {
        for name in &self.stage_order {
            let spec = &self.stages[name];
            if let Some(dep) = spec.dependencies.iter().find(|d| !self.stages.contains_key(*d)) {
                return Err(GraphValidationError::new(format!(
                    "Stage '{}' depends on unknown stage '{}'",
                    spec.name, dep
                ))
                .with_stages(vec![spec.name.clone(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new(codes::MISSING_DEP, format!("Dependency '{dep}' not found"))
                        .with_fix_hint("Add the dependency to the graph or remove the edge."),
                ));
            }
        }
        Ok(())
    }

    fn check_output_collisions(&self) -> Result<(), GraphValidationError> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for name in &self.stage_order {
            for field in self.stages[name].produced_outputs() {
                if let Some(owner) = owners.insert(field.as_str(), name.as_str()) {
                    return Err(GraphValidationError::new(format!(
                        "Output field '{field}' is declared by both '{owner}' and '{name}'"
                    ))
                    .with_stages(vec![owner.to_string(), name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(codes::COLLISION, format!("Field '{field}' has two writers"))
                            .with_context_entry("field", field.as_str())
                            .with_fix_hint("Each result field must be produced by exactly one stage."),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_topology(&self) -> Result<(), GraphValidationError> {
        let topology = |message: String, stages: Vec<String>| {
            GraphValidationError::new(message.clone())
                .with_stages(stages)
                .with_error_info(ContractErrorInfo::new(codes::TOPOLOGY, message))
        };

        let entries = self.names_with_role(StageRole::Entry);
        let aggregations = self.names_with_role(StageRole::Aggregation);
        let fan_out: BTreeSet<String> = self.names_with_role(StageRole::FanOut).into_iter().collect();

        let [entry] = entries.as_slice() else {
            return Err(topology(
                format!("Graph must have exactly one entry stage, found {}", entries.len()),
                entries,
            ));
        };
        let [aggregation] = aggregations.as_slice() else {
            return Err(topology(
                format!(
                    "Graph must have exactly one aggregation stage, found {}",
                    aggregations.len()
                ),
                aggregations,
            ));
        };

        if !self.stages[entry].dependencies.is_empty() {
            return Err(topology(
                format!("Entry stage '{entry}' must not have dependencies"),
                vec![entry.clone()],
            ));
        }

        for name in &fan_out {
            let deps = &self.stages[name].dependencies;
            if deps.len() != 1 || !deps.contains(entry) {
                return Err(topology(
                    format!("Fan-out stage '{name}' must depend only on entry stage '{entry}'"),
                    vec![name.clone()],
                ));
            }
        }

        if fan_out.is_empty() {
            return Err(topology(
                format!(
                    "Graph must have at least one fan-out stage between entry '{entry}' and aggregation '{aggregation}'"
                ),
                vec![aggregation.clone()],
            ));
        }

        if self.stages[aggregation].dependencies != fan_out {
            return Err(topology(
                format!("Aggregation stage '{aggregation}' must depend on every fan-out stage and nothing else"),
                vec![aggregation.clone()],
            ));
        }

        Ok(())
    }

    fn check_coverage(&self) -> Result<(), GraphValidationError> {
        let Some(aggregation) = self.names_with_role(StageRole::Aggregation).pop() else {
            return Ok(());
        };
        let spec = &self.stages[&aggregation];
        let produced: HashSet<&String> = self
            .stages
            .values()
            .filter(|s| s.name != aggregation)
            .flat_map(|s| s.produced_outputs())
            .collect();

        let uncovered: Vec<String> = spec
            .contract
            .inputs()
            .into_iter()
            .filter(|field| !produced.contains(field))
            .collect();

        if uncovered.is_empty() {
            return Ok(());
        }
        Err(GraphValidationError::new(format!(
            "Aggregation stage '{aggregation}' reads fields no stage produces: {}",
            uncovered.join(", ")
        ))
        .with_stages(vec![aggregation])
        .with_error_info(
            ContractErrorInfo::new(codes::COVERAGE, "Aggregation input is never produced")
                .with_context_entry("fields", uncovered.join(","))
                .with_fix_hint("Declare the field as an output of an upstream stage."),
        ))
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.stage_order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(spec) = self.stages.get(node) {
            for dep in &spec.dependencies {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}
