//! Round-by-round scheduling over a validated dependency graph.
//!
//! Each node tracks how many of its dependencies are still outstanding. A node
//! with none outstanding is ready; completing a node decrements the count of
//! every node that depends on it. The graph itself is never mutated.

use super::DependencyGraph;
use crate::core::StackError;
use anyhow::Result;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ScheduleNode {
    alias: String,
    outstanding: usize,
    dependents: Vec<usize>,
    done: bool,
}

/// Execution schedule for one run.
#[derive(Debug, Clone)]
pub struct Schedule {
    nodes: Vec<ScheduleNode>,
    index: HashMap<String, usize>,
}

impl Schedule {
    /// Build the schedule for `graph`. Nodes are kept in alias order.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let aliases = graph.aliases();
        let index: HashMap<String, usize> =
            aliases.iter().enumerate().map(|(i, alias)| (alias.clone(), i)).collect();

        let mut nodes: Vec<ScheduleNode> = aliases
            .iter()
            .map(|alias| ScheduleNode {
                alias: alias.clone(),
                outstanding: 0,
                dependents: Vec::new(),
                done: false,
            })
            .collect();

        for (position, alias) in aliases.iter().enumerate() {
            for dependency in graph.dependencies_of(alias) {
                if let Some(&dep_position) = index.get(&dependency) {
                    nodes[position].outstanding += 1;
                    nodes[dep_position].dependents.push(position);
                }
            }
        }

        Self {
            nodes,
            index,
        }
    }

    /// Pending nodes with no outstanding dependencies, in alias order.
    pub fn ready(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| !node.done && node.outstanding == 0)
            .map(|node| node.alias.clone())
            .collect()
    }

    /// Mark `alias` complete and release its dependents.
    ///
    /// Completing an unknown or already completed alias does nothing.
    pub fn complete(&mut self, alias: &str) {
        let Some(&position) = self.index.get(alias) else {
            return;
        };
        if self.nodes[position].done {
            return;
        }
        self.nodes[position].done = true;
        let dependents = self.nodes[position].dependents.clone();
        for dependent in dependents {
            let node = &mut self.nodes[dependent];
            node.outstanding = node.outstanding.saturating_sub(1);
        }
    }

    /// Whether every node has completed.
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|node| node.done)
    }

    /// Aliases not yet completed, in alias order.
    pub fn pending(&self) -> Vec<String> {
        self.nodes.iter().filter(|node| !node.done).map(|node| node.alias.clone()).collect()
    }
}

/// Layer `graph` into the rounds the executor would run, without running anything.
pub fn plan_rounds(graph: &DependencyGraph) -> Result<Vec<Vec<String>>> {
    let mut schedule = Schedule::from_graph(graph);
    let mut rounds = Vec::new();

    while !schedule.is_finished() {
        let ready = schedule.ready();
        if ready.is_empty() {
            return Err(StackError::ExecutionStalled {
                pending: schedule.pending(),
            }
            .into());
        }
        for alias in &ready {
            schedule.complete(alias);
        }
        rounds.push(ready);
    }

    Ok(rounds)
}
