use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// A named unit of work parsed from one caller line.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub name: String,
    /// Dependencies as declared, duplicates included.
    pub dependencies: Vec<String>,
    pub is_major: bool,
    /// Simulated execution cost, in ms.
    pub burst_time_ms: u64,
}

impl WorkItem {
    pub fn new(name: &str, burst_time_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            is_major: false,
            burst_time_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub item_count: usize,
    pub edge_count: usize,
    pub major_count: usize,
    /// Dependency names that never appear as a caller.
    pub leaf_only_count: usize,
}

/// Dependency graph over work items, owned by a single pipeline run.
///
/// Maps keep insertion order (first appearance in the input) so every pass
/// over the graph is reproducible for a given input.
#[derive(Debug, Default)]
pub struct CallGraph {
    items: IndexMap<String, WorkItem>,
    /// name -> distinct dependency names
    dependencies: IndexMap<String, IndexSet<String>>,
    /// name -> number of call sites naming it as a dependency
    call_counts: HashMap<String, usize>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a work item unless it already exists. `burst` is only invoked
    /// for a new item, so a caller spread over several lines keeps its first
    /// burst time.
    pub fn upsert_item(&mut self, name: &str, burst: impl FnOnce() -> u64) -> &mut WorkItem {
        if !self.items.contains_key(name) {
            self.dependencies.entry(name.to_string()).or_default();
        }
        self.items
            .entry(name.to_string())
            .or_insert_with(|| WorkItem::new(name, burst()))
    }

    /// Record that `caller` depends on `callee`. The caller must already
    /// exist; the callee need not.
    pub fn add_dependency(&mut self, caller: &str, callee: &str) {
        if let Some(item) = self.items.get_mut(caller) {
            item.dependencies.push(callee.to_string());
        }
        self.dependencies
            .entry(caller.to_string())
            .or_default()
            .insert(callee.to_string());
        *self.call_counts.entry(callee.to_string()).or_default() += 1;
    }

    /// Mark items major when they declare more than two dependencies or are
    /// called from more than one site. Must run after every line is parsed.
    pub fn classify_major(&mut self) {
        for item in self.items.values_mut() {
            let calls = self.call_counts.get(&item.name).copied().unwrap_or(0);
            item.is_major = item.dependencies.len() > 2 || calls > 1;
        }
    }

    pub fn item(&self, name: &str) -> Option<&WorkItem> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Items in first-appearance order.
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.values()
    }

    /// Item names in first-appearance order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Position of an item in first-appearance order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.items.get_index_of(name)
    }

    /// Distinct dependencies of `name`, in declaration order. Unknown names
    /// have none.
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.call_counts.get(name).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let edge_count = self.dependencies.values().map(IndexSet::len).sum();
        let major_count = self.items.values().filter(|i| i.is_major).count();
        let leaf_only_count = self
            .call_counts
            .keys()
            .filter(|name| !self.items.contains_key(*name))
            .count();

        GraphStats {
            item_count: self.items.len(),
            edge_count,
            major_count,
            leaf_only_count,
        }
    }
}
