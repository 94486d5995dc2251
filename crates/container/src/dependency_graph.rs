//! Статический граф зависимостей между definitions
//!
//! Ребро `a -> b` означает: constructor `a` имеет input, который может быть
//! разрешён definition `b` (по qualifier или по совместимому типу).
//! Граф не строит экземпляры, только описывает их.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use tracing::{debug, warn};

use crate::descriptor::TypeDescriptor;
use crate::registry::DefinitionRegistry;

/// Input, для которого не нашлось ни одного кандидата
#[derive(Debug, Clone)]
pub struct MissingDependency {
    pub definition: String,
    pub index: usize,
    pub target: TypeDescriptor,
    pub qualifier: Option<String>,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(
                f,
                "'{}' input #{} requires definition '{}' ({})",
                self.definition, self.index, qualifier, self.target
            ),
            None => write!(
                f,
                "'{}' input #{} requires {}",
                self.definition, self.index, self.target
            ),
        }
    }
}

/// Граф зависимостей definitions
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// definition -> definitions, от которых она зависит
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// definition -> definitions, которые от неё зависят
    dependents: BTreeMap<String, BTreeSet<String>>,
    missing: Vec<MissingDependency>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Построить граф по снапшоту registry
    pub fn from_registry(registry: &DefinitionRegistry) -> Self {
        let mut graph = Self::new();

        for definition in registry.definitions() {
            graph.add_node(definition.name());

            for input in definition.inputs() {
                let target = input.resolution_type();
                let candidates = match input.name() {
                    Some(qualifier) => registry
                        .find(qualifier)
                        .map(|_| vec![qualifier.to_string()])
                        .unwrap_or_default(),
                    None => registry.definition_names_by_type(target),
                };

                if candidates.is_empty() && !input.is_optional() {
                    graph.missing.push(MissingDependency {
                        definition: definition.name().to_string(),
                        index: input.index(),
                        target: target.clone(),
                        qualifier: input.name().map(str::to_string),
                    });
                }
                for candidate in candidates {
                    graph.add_dependency(definition.name(), &candidate);
                }
            }
        }

        debug!(
            "Built dependency graph: {} nodes, {} missing dependencies",
            graph.dependencies.len(),
            graph.missing.len()
        );
        graph
    }

    pub fn add_node(&mut self, name: &str) {
        self.dependencies.entry(name.to_string()).or_default();
        self.dependents.entry(name.to_string()).or_default();
    }

    /// dependent зависит от dependency
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        self.add_node(dependent);
        self.add_node(dependency);
        self.dependencies
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());
        self.dependents
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.dependencies
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_dependency(&self, dependent: &str, dependency: &str) -> bool {
        self.dependencies
            .get(dependent)
            .map(|deps| deps.contains(dependency))
            .unwrap_or(false)
    }

    pub fn missing_dependencies(&self) -> &[MissingDependency] {
        &self.missing
    }

    /// Все циклы; каждый цикл замкнут: `[a, b, a]`
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        let mut path = Vec::new();

        for node in self.dependencies.keys() {
            let node = node.as_str();
            if !visited.contains(node) {
                self.dfs_find_cycles(node, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn dfs_find_cycles<'a>(
        &'a self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        on_stack: &mut BTreeSet<&'a str>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        if let Some(deps) = self.dependencies.get(node) {
            for neighbor in deps {
                let neighbor = neighbor.as_str();
                if !visited.contains(neighbor) {
                    self.dfs_find_cycles(neighbor, visited, on_stack, path, cycles);
                } else if on_stack.contains(neighbor) {
                    if let Some(start) = path.iter().position(|&n| n == neighbor) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(neighbor.to_string());
                        cycles.push(cycle);
                    }
                }
            }
        }

        on_stack.remove(node);
        path.pop();
    }

    /// Порядок построения: зависимости раньше зависимых.
    /// Узлы, участвующие в циклах, идут в конце в порядке имён.
    pub fn topological_order(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut queue: VecDeque<&str> = remaining
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut order = Vec::with_capacity(remaining.len());

        while let Some(node) = queue.pop_front() {
            remaining.remove(node);
            order.push(node.to_string());

            if let Some(dependents) = self.dependents.get(node) {
                for dependent in dependents {
                    if let Some(degree) = remaining.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if !remaining.is_empty() {
            warn!(
                "{} definitions are part of dependency cycles: {:?}",
                remaining.len(),
                remaining.keys().collect::<Vec<_>>()
            );
            order.extend(remaining.keys().map(|name| name.to_string()));
        }
        order
    }

    pub fn validate(&self) -> ValidationReport {
        ValidationReport {
            cycles: self.find_cycles(),
            missing: self.missing.clone(),
        }
    }

    pub fn stats(&self) -> DependencyGraphStats {
        DependencyGraphStats {
            total_nodes: self.dependencies.len(),
            total_edges: self.dependencies.values().map(|deps| deps.len()).sum(),
            max_dependencies: self
                .dependencies
                .values()
                .map(|deps| deps.len())
                .max()
                .unwrap_or(0),
            max_dependents: self
                .dependents
                .values()
                .map(|deps| deps.len())
                .max()
                .unwrap_or(0),
        }
    }
}

/// Статистика графа зависимостей
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyGraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_dependencies: usize,
    pub max_dependents: usize,
}

/// Результат статической проверки definitions
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub cycles: Vec<Vec<String>>,
    pub missing: Vec<MissingDependency>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.cycles.is_empty() && self.missing.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str("dependency graph is valid");
        }
        let mut problems = Vec::new();
        for cycle in &self.cycles {
            problems.push(format!("cycle {}", cycle.join(" -> ")));
        }
        for missing in &self.missing {
            problems.push(missing.to_string());
        }
        write!(f, "{}", problems.join("; "))
    }
}
