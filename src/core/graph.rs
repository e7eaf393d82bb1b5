//! Dependency graph
//!
//! Turns a set of service descriptors into a validated DAG. Nodes are stored
//! in an arena sorted by identifier and addressed by index; both edge
//! directions are kept so the scheduler can walk dependents cheaply.

use std::collections::{HashMap, HashSet};

use crate::core::descriptor::ServiceDescriptor;
use crate::error::GraphError;

/// Validated, acyclic service dependency graph
#[derive(Debug, Clone)]
pub struct BuildGraph {
    /// Descriptors sorted by identifier
    nodes: Vec<ServiceDescriptor>,
    /// Identifier -> node index
    index: HashMap<String, usize>,
    /// node -> nodes it depends on
    dependencies: Vec<Vec<usize>>,
    /// node -> nodes depending on it
    dependents: Vec<Vec<usize>>,
    /// Topological layers of node indices
    layers: Vec<Vec<usize>>,
}

impl BuildGraph {
    /// Build and validate a graph
    ///
    /// Fails with [`GraphError::DuplicateService`], [`GraphError::UnknownDependency`]
    /// or [`GraphError::CycleDetected`].
    pub fn build(descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Result<Self, GraphError> {
        let mut nodes: Vec<ServiceDescriptor> = descriptors.into_iter().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateService {
                    name: node.name.clone(),
                });
            }
        }

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &node.dependencies {
                let Some(&d) = index.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        service: node.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                // Repeated declarations collapse to one edge
                if seen.insert(d) {
                    dependencies[i].push(d);
                    dependents[d].push(i);
                }
            }
        }

        let mut graph = Self {
            nodes,
            index,
            dependencies,
            dependents,
            layers: Vec::new(),
        };
        graph.layers = graph.compute_layers()?;

        tracing::debug!(
            "Built dependency graph: {} services in {} layers",
            graph.len(),
            graph.layers.len()
        );
        Ok(graph)
    }

    /// Kahn-style layering: each layer holds nodes whose dependencies all sit
    /// in earlier layers
    fn compute_layers(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut current: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut layers = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for &node in &current {
                for &dependent in &self.dependents[node] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            layers.push(std::mem::replace(&mut current, next));
        }

        if placed < self.nodes.len() {
            let stuck: HashSet<usize> = (0..self.nodes.len()).filter(|&i| remaining[i] > 0).collect();
            return Err(GraphError::CycleDetected {
                cycle: self.find_cycle(&stuck),
            });
        }

        Ok(layers)
    }

    /// Walk dependency edges among unplaced nodes until a node repeats
    ///
    /// Every unplaced node has at least one unplaced dependency, so the walk
    /// always closes a loop.
    fn find_cycle(&self, stuck: &HashSet<usize>) -> Vec<String> {
        let Some(&start) = stuck.iter().min() else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut position = HashMap::from([(start, 0usize)]);
        let mut current = start;

        loop {
            let Some(&next) = self.dependencies[current]
                .iter()
                .find(|&&d| stuck.contains(&d))
            else {
                break;
            };
            if let Some(&pos) = position.get(&next) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&i| self.nodes[i].name.clone())
                    .collect();
                cycle.push(self.nodes[next].name.clone());
                return cycle;
            }
            position.insert(next, path.len());
            path.push(next);
            current = next;
        }

        path.iter().map(|&i| self.nodes[i].name.clone()).collect()
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no services
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Descriptor at `node`
    pub fn node(&self, node: usize) -> &ServiceDescriptor {
        &self.nodes[node]
    }

    /// All descriptors, sorted by identifier
    pub fn nodes(&self) -> &[ServiceDescriptor] {
        &self.nodes
    }

    /// Index of the service named `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Direct dependencies of `node`
    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    /// Direct dependents of `node`
    pub fn dependents(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// Topological layers as node indices
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// Topological layers as service identifiers
    pub fn layer_names(&self) -> Vec<Vec<String>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|&i| self.nodes[i].name.clone()).collect())
            .collect()
    }

    /// Widest layer, the most services that can ever usefully run at once
    pub fn max_parallelism(&self) -> usize {
        self.layers.iter().map(Vec::len).max().unwrap_or(0)
    }
}
