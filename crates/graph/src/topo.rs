use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::model::CallGraph;

/// The dependency graph with every grouped item and every non-item name
/// removed.
#[derive(Debug)]
pub struct ReducedGraph<'a> {
    /// Remaining items (first-appearance order) -> number of remaining
    /// dependencies.
    in_degree: IndexMap<&'a str, usize>,
    /// dependency -> items that depend on it, in edge insertion order
    dependents: IndexMap<&'a str, Vec<&'a str>>,
}

/// Linear, dependency-respecting order over the ungrouped items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopoOrder {
    pub order: Vec<String>,
    /// Items that could not be ordered because they still sit on a cycle.
    /// They are appended to `order` in first-appearance order.
    pub residual: usize,
}

impl<'a> ReducedGraph<'a> {
    /// Drop every edge touching a grouped name, keep edges among the rest.
    pub fn build(graph: &'a CallGraph, grouped: &HashSet<String>) -> Self {
        let mut in_degree: IndexMap<&str, usize> = IndexMap::new();
        let mut dependents: IndexMap<&str, Vec<&str>> = IndexMap::new();

        for name in graph.names().filter(|n| !grouped.contains(*n)) {
            in_degree.insert(name, 0);
            dependents.entry(name).or_default();
        }

        for name in graph.names().filter(|n| !grouped.contains(*n)) {
            for dep in graph.dependencies_of(name) {
                if grouped.contains(dep) || !graph.contains(dep) {
                    continue;
                }
                dependents.entry(dep).or_default().push(name);
                *in_degree.entry(name).or_insert(0) += 1;
            }
        }

        Self { in_degree, dependents }
    }

    pub fn node_count(&self) -> usize {
        self.in_degree.len()
    }

    /// Remaining edges as `(item, dependency)` pairs.
    pub fn edges(&self) -> Vec<(&'a str, &'a str)> {
        self.dependents
            .iter()
            .flat_map(|(&dep, users)| users.iter().map(move |&user| (user, dep)))
            .collect()
    }

    /// Kahn's algorithm.
    ///
    /// Ready items are processed FIFO; the initial queue and every batch of
    /// newly released dependents keep first-appearance / edge insertion
    /// order, so the result is stable for a given input.
    pub fn kahn_order(&self) -> TopoOrder {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(users) = self.dependents.get(node) {
                for &user in users {
                    if let Some(deg) = in_degree.get_mut(user) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(user);
                        }
                    }
                }
            }
        }

        let mut residual = 0;
        if order.len() != in_degree.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(&name, _)| name)
                .collect();
            warn!(
                count = stuck.len(),
                items = %stuck.join(", "),
                "cycle left after reduction, appending in input order"
            );
            residual = stuck.len();
            order.extend(stuck.into_iter().map(str::to_string));
        }

        TopoOrder { order, residual }
    }
}

/// Order every ungrouped item of `graph` by its remaining dependencies.
pub fn topological_order(graph: &CallGraph, grouped: &HashSet<String>) -> TopoOrder {
    ReducedGraph::build(graph, grouped).kahn_order()
}
