use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::model::CallGraph;

/// A cluster of mutually dependent work items, scheduled as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleGroup {
    /// Members in first-appearance order.
    pub members: Vec<String>,
}

impl CycleGroup {
    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

const UNVISITED: usize = usize::MAX;

/// Find every cyclic cluster in the graph.
///
/// Tarjan's strongly-connected-components search over an explicit frame
/// stack. DFS roots are taken in first-appearance order and visited state is
/// shared across roots, so each item is explored exactly once and lands in at
/// most one group. A back-edge to a node still on the stack pulls the whole
/// path from that node to the current one into the same component. A
/// single-item component only counts as a cycle when the item calls itself.
///
/// Groups are returned in the order their components complete. Dependencies
/// on names that are not work items are ignored.
pub fn detect_cycles(graph: &CallGraph) -> Vec<CycleGroup> {
    let names: Vec<&str> = graph.names().collect();
    let slot: HashMap<&str, usize> = names.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let adjacency: Vec<Vec<usize>> = names
        .iter()
        .map(|&n| {
            graph
                .dependencies_of(n)
                .filter_map(|dep| slot.get(dep).copied())
                .collect()
        })
        .collect();

    let n = names.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut groups = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        // (node, position of the next edge to explore)
        let mut frames: Vec<(usize, usize)> = Vec::new();
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, 0));

        while let Some(&(v, pos)) = frames.last() {
            if let Some(&w) = adjacency[v].get(pos) {
                if let Some(top) = frames.last_mut() {
                    top.1 += 1;
                }
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }

            if lowlink[v] != index[v] {
                continue;
            }

            let mut component = Vec::new();
            while let Some(w) = stack.pop() {
                on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }

            let is_cycle = component.len() > 1 || adjacency[v].contains(&v);
            if is_cycle {
                component.sort_unstable();
                let members: Vec<String> =
                    component.iter().map(|&i| names[i].to_string()).collect();
                debug!(members = ?members, "cycle group found");
                groups.push(CycleGroup { members });
            }
        }
    }

    groups
}
