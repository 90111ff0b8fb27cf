//! Component dependency graph
//!
//! Edges point from a component to the components whose outputs its inputs
//! reference, so `a → b` means `b` must finish before `a` starts. The graph is
//! built once per run, validated to be acyclic, and then consumed through a
//! [`scheduler::Schedule`] by the [`executor::GraphExecutor`].

pub mod dependencies;
pub mod executor;
pub mod scheduler;

use crate::component::ComponentDescriptor;
use crate::core::StackError;
use anyhow::Result;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

pub use executor::{GraphExecutor, OutputsMap};
pub use scheduler::{Schedule, plan_rounds};

/// Dependency graph over component aliases.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<String, ()>,
    /// Map from aliases to their graph indices.
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a set of components: one node per alias, one edge per dependency.
    pub fn from_components(components: &BTreeMap<String, ComponentDescriptor>) -> Self {
        let mut graph = Self::new();
        for alias in components.keys() {
            graph.ensure_node(alias);
        }
        for (alias, descriptor) in components {
            for dependency in &descriptor.dependencies {
                graph.add_dependency(alias, dependency);
            }
        }
        graph
    }

    /// Add a node to the graph if it doesn't already exist.
    pub fn ensure_node(&mut self, alias: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(alias) {
            index
        } else {
            let index = self.graph.add_node(alias.to_string());
            self.node_map.insert(alias.to_string(), index);
            index
        }
    }

    /// Record that `from` depends on `to`.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        // Check if edge already exists to avoid duplicates
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Fail with [`StackError::CircularDependency`] if the graph has any cycle.
    pub fn validate(&self) -> Result<()> {
        let cycles = self.find_cycles();
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(StackError::CircularDependency {
                cycles,
            }
            .into())
        }
    }

    /// One concrete cycle per strongly connected component that has one.
    ///
    /// Each cycle starts and ends at the smallest alias of its component and is
    /// a shortest path back to it. Cycles are sorted by their first alias.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter_map(|scc| {
                if scc.len() == 1 {
                    let node = scc[0];
                    return self
                        .graph
                        .contains_edge(node, node)
                        .then(|| vec![self.graph[node].clone(), self.graph[node].clone()]);
                }
                self.cycle_within(&scc)
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Breadth-first search from the smallest alias back to itself, staying inside `scc`.
    fn cycle_within(&self, scc: &[NodeIndex]) -> Option<Vec<String>> {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let start = *scc.iter().min_by(|a, b| self.graph[**a].cmp(&self.graph[**b]))?;

        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in self.sorted_neighbors(current) {
                if next == start {
                    let mut interior = Vec::new();
                    let mut cursor = current;
                    while cursor != start {
                        interior.push(self.graph[cursor].clone());
                        cursor = *parents.get(&cursor)?;
                    }
                    interior.reverse();

                    let mut path = Vec::with_capacity(interior.len() + 2);
                    path.push(self.graph[start].clone());
                    path.extend(interior);
                    path.push(self.graph[start].clone());
                    return Some(path);
                }
                if members.contains(&next) && !parents.contains_key(&next) {
                    parents.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn sorted_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        neighbors.dedup();
        neighbors
    }

    /// Direct dependencies of `alias`, sorted.
    pub fn dependencies_of(&self, alias: &str) -> Vec<String> {
        self.node_map
            .get(alias)
            .map(|&index| {
                self.sorted_neighbors(index).into_iter().map(|n| self.graph[n].clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Every alias in the graph, sorted.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.node_map.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the total number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
