use std::collections::HashSet;
use std::time::Instant;

use threadsim_core::AnalysisConfig;
use tracing::info;

use crate::cycles::{detect_cycles, CycleGroup};
use crate::model::CallGraph;
use crate::parse::{parse_edge_list, ParseSummary, ParsedGraph};
use crate::topo::{topological_order, TopoOrder};
use crate::units::{assign_units, UnitPlan};

/// Everything the analysis stage produces for one edge list.
pub struct Analysis {
    pub graph: CallGraph,
    pub summary: ParseSummary,
    pub groups: Vec<CycleGroup>,
    pub topo: TopoOrder,
    pub plan: UnitPlan,
}

impl Analysis {
    /// Parse, group, order and assign units in one pass.
    pub fn run(input: &str, config: &AnalysisConfig) -> Self {
        Self::from_parsed(parse_edge_list(input, config), config)
    }

    /// Group, order and assign units for an already parsed graph.
    pub fn from_parsed(parsed: ParsedGraph, config: &AnalysisConfig) -> Self {
        let start = Instant::now();
        let ParsedGraph { graph, summary } = parsed;
        let groups = detect_cycles(&graph);
        let grouped: HashSet<String> = groups
            .iter()
            .flat_map(|g| g.members.iter().cloned())
            .collect();
        info!(
            groups = groups.len(),
            grouped_items = grouped.len(),
            "cycle detection done"
        );

        let topo = topological_order(&graph, &grouped);
        let plan = assign_units(&graph, &groups, &topo, config);

        info!(
            units = plan.len(),
            dropped = plan.dropped_units,
            total_burst_ms = plan.total_burst_ms(),
            "Analysis complete in {:.3}s",
            start.elapsed().as_secs_f64()
        );

        Self {
            graph,
            summary,
            groups,
            topo,
            plan,
        }
    }

    /// Names covered by cycle groups.
    pub fn grouped_names(&self) -> HashSet<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.members.iter().map(String::as_str))
            .collect()
    }
}
